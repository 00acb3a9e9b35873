//! Purchase facade: the boundary consumed by the HTTP layer and CLI.
//!
//! Validates input, rejects a second in-flight purchase by the same user in
//! this process, runs the allocator, and hands the result to commission
//! accrual without waiting for it. The in-flight check only spares the user
//! a confusing double purchase; exclusivity of credentials comes from the
//! allocator's conditional claim.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use hotspot_core::db::unix_timestamp;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::activation;
use crate::allocator::{AllocationRequest, Allocator};
use crate::commission::CommissionAccrual;
use crate::error::PurchaseError;
use crate::storage::{
    BillingDatabase, ClaimAudit, Purchase, PurchaseStatus, PurchaseWithCredential,
    ReferralSummary,
};
use crate::store::{CredentialPool, LedgerStore, PlanCatalog, UserDirectory};
use crate::telemetry;

/// Maximum purchases returned by one history page.
pub const HISTORY_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSecret {
    pub username: String,
    pub password: String,
}

/// What the caller shows the user after a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub purchase_id: String,
    pub credential: CredentialSecret,
    pub amount: i64,
    /// `None` until a deferred purchase is activated.
    pub expires_at: Option<i64>,
    pub status: PurchaseStatus,
}

impl Receipt {
    fn from_stored(row: PurchaseWithCredential, now: i64) -> Self {
        Self {
            status: row.purchase.status_at(now),
            purchase_id: row.purchase.id,
            credential: CredentialSecret {
                username: row.username,
                password: row.password,
            },
            amount: row.purchase.amount,
            expires_at: row.purchase.expires_at,
        }
    }
}

/// Users with a purchase currently running in this process.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn enter(&self, user_id: &str) -> Option<InFlightGuard> {
        let mut users = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        users.insert(user_id.to_string()).then(|| InFlightGuard {
            users: self.clone(),
            user_id: user_id.to_string(),
        })
    }
}

struct InFlightGuard {
    users: InFlight,
    user_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.users
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

#[derive(Clone)]
pub struct PurchaseService<S> {
    allocator: Allocator<S>,
    commission: CommissionAccrual<S>,
    in_flight: InFlight,
}

impl<S> PurchaseService<S>
where
    S: LedgerStore + CredentialPool + PlanCatalog + UserDirectory,
{
    pub fn new(store: S, commission_rate_bps: u32) -> Self {
        Self {
            commission: CommissionAccrual::new(store.clone(), commission_rate_bps),
            allocator: Allocator::new(store),
            in_flight: InFlight::default(),
        }
    }

    pub const fn commission(&self) -> &CommissionAccrual<S> {
        &self.commission
    }

    /// Buy `plan_id` at `location_id` for `user_id`.
    #[instrument(skip(self))]
    pub async fn purchase(
        &self,
        user_id: &str,
        plan_id: &str,
        location_id: &str,
    ) -> Result<Receipt, PurchaseError> {
        let result = self.purchase_inner(user_id, plan_id, location_id).await;
        telemetry::record_purchase(result.as_ref().map_or_else(PurchaseError::code, |_| "ok"));
        result
    }

    async fn purchase_inner(
        &self,
        user_id: &str,
        plan_id: &str,
        location_id: &str,
    ) -> Result<Receipt, PurchaseError> {
        for (field, value) in [
            ("user_id", user_id),
            ("plan_id", plan_id),
            ("location_id", location_id),
        ] {
            if value.trim().is_empty() {
                return Err(PurchaseError::InvalidRequest(format!("{field} is required")));
            }
        }

        let _guard = self.in_flight.enter(user_id).ok_or(PurchaseError::Busy)?;

        let store = self.allocator.store();
        store
            .plan(plan_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| PurchaseError::PlanUnavailable(plan_id.to_string()))?;
        store
            .location(location_id)
            .await?
            .filter(|l| l.active)
            .ok_or_else(|| PurchaseError::LocationUnavailable(location_id.to_string()))?;

        let allocation = self
            .allocator
            .allocate(&AllocationRequest {
                user_id: user_id.to_string(),
                plan_id: plan_id.to_string(),
                location_id: location_id.to_string(),
            })
            .await?;

        self.commission.spawn_accrue(allocation.purchase.clone());

        let purchase = allocation.purchase;
        Ok(Receipt {
            status: purchase.status_at(unix_timestamp()),
            purchase_id: purchase.id,
            credential: CredentialSecret {
                username: allocation.credential.username,
                password: allocation.credential.password,
            },
            amount: purchase.amount,
            expires_at: purchase.expires_at,
        })
    }
}

impl PurchaseService<BillingDatabase> {
    fn db(&self) -> &BillingDatabase {
        self.allocator.store()
    }

    /// Re-read the receipt of a purchase owned by `user_id`.
    pub async fn receipt(&self, purchase_id: &str, user_id: &str) -> Result<Receipt, PurchaseError> {
        self.db()
            .get_purchase_with_credential(purchase_id, user_id)
            .await?
            .map(|row| Receipt::from_stored(row, unix_timestamp()))
            .ok_or_else(|| PurchaseError::PurchaseNotFound(purchase_id.to_string()))
    }

    /// Activate a deferred purchase and return its receipt.
    #[instrument(skip(self))]
    pub async fn activate(&self, purchase_id: &str, user_id: &str) -> Result<Receipt, PurchaseError> {
        activation::activate(self.db(), purchase_id, user_id, unix_timestamp()).await?;
        self.receipt(purchase_id, user_id).await
    }

    /// Purchase history, newest first.
    pub async fn purchases(&self, user_id: &str, offset: u32) -> Result<Vec<Purchase>, PurchaseError> {
        let now = unix_timestamp();
        let mut purchases = self
            .db()
            .list_purchases(user_id, HISTORY_PAGE_LIMIT, offset)
            .await?;
        for purchase in &mut purchases {
            purchase.status = purchase.status_at(now);
        }
        Ok(purchases)
    }

    pub async fn balance(&self, user_id: &str) -> Result<i64, PurchaseError> {
        Ok(self.db().wallet_balance(user_id).await?)
    }

    pub async fn referral_summary(&self, referrer_id: &str) -> Result<ReferralSummary, PurchaseError> {
        Ok(self.commission.summary(referrer_id).await?)
    }

    /// Check the pool against the purchase ledger.
    ///
    /// Any orphaned claim or unbacked purchase is reported as
    /// `InternalInconsistency`; nothing is repaired here.
    pub async fn verify_claims(&self) -> Result<ClaimAudit, PurchaseError> {
        let audit = self.db().audit_claims().await?;
        if audit.is_clean() {
            return Ok(audit);
        }
        error!(
            orphaned_claims = audit.orphaned_claims.len(),
            unbacked_purchases = audit.unbacked_purchases.len(),
            "Claim audit found inconsistencies"
        );
        Err(PurchaseError::InternalInconsistency(format!(
            "{} orphaned claim(s), {} unbacked purchase(s)",
            audit.orphaned_claims.len(),
            audit.unbacked_purchases.len()
        )))
    }
}
