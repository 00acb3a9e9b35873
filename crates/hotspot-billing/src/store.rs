//! Store seams used by the allocator, commission accrual, and purchase facade.
//!
//! [`BillingDatabase`] implements every trait; tests wrap it to inject
//! failures at a single step of the protocol.

use std::future::Future;

use crate::storage::{
    BillingDatabase, Credential, DatabaseError, DebitOutcome, EarningParams, Location,
    NewPurchase, Plan, Purchase,
};

/// Wallet balances, purchase records, and referral earnings.
pub trait LedgerStore: Clone + Send + Sync + 'static {
    fn wallet_balance(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<i64, DatabaseError>> + Send;

    /// Debit the wallet and insert the purchase in one atomic unit.
    fn debit_for_purchase(
        &self,
        purchase: &NewPurchase,
    ) -> impl Future<Output = Result<DebitOutcome, DatabaseError>> + Send;

    fn purchase(
        &self,
        purchase_id: &str,
    ) -> impl Future<Output = Result<Option<Purchase>, DatabaseError>> + Send;

    /// Insert an earning keyed by purchase id; `false` if one already exists.
    fn record_earning(
        &self,
        params: &EarningParams<'_>,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

/// Exclusive claims on pre-provisioned credentials.
pub trait CredentialPool: Clone + Send + Sync + 'static {
    fn claim(
        &self,
        location_id: &str,
        plan_id: &str,
        user_id: &str,
        now: i64,
    ) -> impl Future<Output = Result<Option<Credential>, DatabaseError>> + Send;

    /// Undo a claim that has no purchase. `false` means nothing was released.
    fn release(
        &self,
        credential_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

/// Plans and locations, read at call time.
pub trait PlanCatalog: Clone + Send + Sync + 'static {
    fn plan(&self, plan_id: &str)
    -> impl Future<Output = Result<Option<Plan>, DatabaseError>> + Send;

    fn location(
        &self,
        location_id: &str,
    ) -> impl Future<Output = Result<Option<Location>, DatabaseError>> + Send;
}

/// Referral relationships.
pub trait UserDirectory: Clone + Send + Sync + 'static {
    fn referrer(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<String>, DatabaseError>> + Send;
}

impl LedgerStore for BillingDatabase {
    async fn wallet_balance(&self, user_id: &str) -> Result<i64, DatabaseError> {
        Self::wallet_balance(self, user_id).await
    }

    async fn debit_for_purchase(
        &self,
        purchase: &NewPurchase,
    ) -> Result<DebitOutcome, DatabaseError> {
        Self::debit_for_purchase(self, purchase).await
    }

    async fn purchase(&self, purchase_id: &str) -> Result<Option<Purchase>, DatabaseError> {
        self.get_purchase(purchase_id).await
    }

    async fn record_earning(&self, params: &EarningParams<'_>) -> Result<bool, DatabaseError> {
        self.insert_earning(params).await
    }
}

impl CredentialPool for BillingDatabase {
    async fn claim(
        &self,
        location_id: &str,
        plan_id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<Option<Credential>, DatabaseError> {
        self.claim_credential(location_id, plan_id, user_id, now)
            .await
    }

    async fn release(&self, credential_id: &str, user_id: &str) -> Result<bool, DatabaseError> {
        self.release_claim(credential_id, user_id).await
    }
}

impl PlanCatalog for BillingDatabase {
    async fn plan(&self, plan_id: &str) -> Result<Option<Plan>, DatabaseError> {
        self.get_plan(plan_id).await
    }

    async fn location(&self, location_id: &str) -> Result<Option<Location>, DatabaseError> {
        self.get_location(location_id).await
    }
}

impl UserDirectory for BillingDatabase {
    async fn referrer(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        self.referrer_of(user_id).await
    }
}
