//! SQLite storage for hotspot billing.
//!
//! Provides persistence for the catalog (plans, locations, users), wallets and
//! their ledger, the credential pool, purchases, and referral earnings.

mod db;
mod models;
mod queries_audit;
mod queries_catalog;
mod queries_ledger;
mod queries_pool;
mod queries_referral;

#[cfg(test)]
mod tests;

pub use db::{BillingDatabase, DatabaseError};
pub use models::*;
pub use queries_audit::CLAIM_GRACE_SECS;
pub use queries_catalog::PlanParams;
pub use queries_referral::EarningParams;
