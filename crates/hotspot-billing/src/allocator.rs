//! Claim-and-debit allocator.
//!
//! Protocol for one `(user, plan, location)` request:
//! 1. Read the plan price and the wallet balance fresh from the store.
//! 2. Claim one available credential with a store-level compare-and-swap.
//! 3. Debit the wallet and insert the purchase atomically.
//! 4. If step 3 fails, release the claim. A claimed credential without a
//!    purchase is never left behind silently.
//!
//! Steps 2 to 4 run on a spawned task. Dropping the caller's future while
//! the claim is in flight does not stop the protocol half way.

use hotspot_core::db::unix_timestamp;
use tracing::{error, info, warn};

use crate::error::PurchaseError;
use crate::storage::{Credential, DebitOutcome, NewPurchase, Plan, Purchase};
use crate::store::{CredentialPool, LedgerStore, PlanCatalog};

/// Inputs to one allocation.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub user_id: String,
    pub plan_id: String,
    pub location_id: String,
}

/// A committed purchase and the credential it owns.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub purchase: Purchase,
    pub credential: Credential,
}

#[derive(Clone)]
pub struct Allocator<S> {
    store: S,
}

impl<S> Allocator<S>
where
    S: LedgerStore + CredentialPool + PlanCatalog,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Run the claim-and-debit protocol once. Never retries internally.
    pub async fn allocate(&self, request: &AllocationRequest) -> Result<Allocation, PurchaseError> {
        let plan = self
            .store
            .plan(&request.plan_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| PurchaseError::PlanUnavailable(request.plan_id.clone()))?;

        let balance = LedgerStore::wallet_balance(&self.store, &request.user_id).await?;
        if balance < plan.price {
            info!(
                user_id = %request.user_id,
                balance,
                price = plan.price,
                "Purchase rejected: insufficient funds"
            );
            return Err(PurchaseError::InsufficientFunds {
                balance,
                price: plan.price,
            });
        }

        let store = self.store.clone();
        let request = request.clone();
        tokio::spawn(claim_and_debit(store, plan, request, unix_timestamp()))
            .await
            .map_err(|e| {
                error!(error = %e, "Allocation task aborted");
                PurchaseError::InternalInconsistency(format!("allocation task aborted: {e}"))
            })?
    }
}

/// Step 2, then hand over to [`complete_claim`].
async fn claim_and_debit<S>(
    store: S,
    plan: Plan,
    request: AllocationRequest,
    now: i64,
) -> Result<Allocation, PurchaseError>
where
    S: LedgerStore + CredentialPool,
{
    let credential = store
        .claim(&request.location_id, &request.plan_id, &request.user_id, now)
        .await?
        .ok_or(PurchaseError::PoolExhausted {
            location_id: request.location_id,
            plan_id: request.plan_id,
        })?;

    complete_claim(store, plan, credential, request.user_id, now).await
}

/// Steps 3 and 4: debit, or compensate.
async fn complete_claim<S>(
    store: S,
    plan: Plan,
    credential: Credential,
    user_id: String,
    now: i64,
) -> Result<Allocation, PurchaseError>
where
    S: LedgerStore + CredentialPool,
{
    let new_purchase = NewPurchase {
        id: uuid::Uuid::new_v4().to_string(),
        user_id,
        plan_id: plan.id.clone(),
        location_id: credential.location_id.clone(),
        credential_id: credential.id.clone(),
        amount: plan.price,
        duration_hours: plan.duration_hours,
        purchased_at: now,
        expires_at: (!plan.deferred_activation).then(|| now + plan.duration_secs()),
    };

    let failure = match store.debit_for_purchase(&new_purchase).await {
        Ok(DebitOutcome::Committed(purchase)) => {
            info!(
                purchase_id = %purchase.id,
                user_id = %purchase.user_id,
                credential_id = %credential.id,
                amount = purchase.amount,
                "Purchase committed"
            );
            return Ok(Allocation {
                purchase,
                credential,
            });
        }
        Ok(DebitOutcome::InsufficientFunds { balance }) => PurchaseError::InsufficientFunds {
            balance,
            price: plan.price,
        },
        Ok(DebitOutcome::ClaimLost) => {
            warn!(
                credential_id = %credential.id,
                "Claim released before debit, nothing charged"
            );
            return Err(PurchaseError::TransientStore(format!(
                "claim on credential {} was released before the debit",
                credential.id
            )));
        }
        Err(e) => {
            warn!(
                credential_id = %credential.id,
                error = %e,
                "Debit failed after claim, compensating"
            );
            PurchaseError::TransientStore(e.to_string())
        }
    };

    match compensate(&store, &new_purchase, &credential).await? {
        Some(purchase) => Ok(Allocation {
            purchase,
            credential,
        }),
        None => Err(failure),
    }
}

/// Release the claim made for `new_purchase`.
///
/// If the release finds the credential already referenced by our purchase,
/// the debit did commit and only its acknowledgement was lost; that
/// purchase is returned instead.
async fn compensate<S>(
    store: &S,
    new_purchase: &NewPurchase,
    credential: &Credential,
) -> Result<Option<Purchase>, PurchaseError>
where
    S: LedgerStore + CredentialPool,
{
    let released = match store.release(&credential.id, &new_purchase.user_id).await {
        Ok(released) => released,
        Err(e) => {
            error!(
                credential_id = %credential.id,
                error = %e,
                "Compensation failed, credential left claimed without purchase"
            );
            return Err(PurchaseError::InternalInconsistency(format!(
                "claim on credential {} could not be released: {e}",
                credential.id
            )));
        }
    };

    if released {
        info!(credential_id = %credential.id, "Claim released");
        return Ok(None);
    }

    match store.purchase(&new_purchase.id).await {
        Ok(Some(purchase)) => {
            warn!(
                purchase_id = %purchase.id,
                credential_id = %credential.id,
                "Debit reported failure but purchase is committed"
            );
            Ok(Some(purchase))
        }
        Ok(None) | Err(_) => {
            error!(
                credential_id = %credential.id,
                purchase_id = %new_purchase.id,
                "Compensation found nothing to release"
            );
            Err(PurchaseError::InternalInconsistency(format!(
                "claim on credential {} could not be released",
                credential.id
            )))
        }
    }
}
