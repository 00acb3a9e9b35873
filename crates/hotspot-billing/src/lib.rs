//! Hotspot Billing Library
//!
//! Core functionality for selling pre-provisioned hotspot credentials:
//! - SQLite storage for wallets, the ledger, credentials, and purchases
//! - Claim-and-debit allocator with compensation
//! - Deferred activation of purchased access windows
//! - Referral commission accrual and reconciliation
//! - Purchase facade consumed by the HTTP server and CLI

pub mod activation;
pub mod allocator;
pub mod commission;
pub mod error;
pub mod facade;
pub mod storage;
pub mod store;
mod telemetry;

pub use allocator::{Allocation, AllocationRequest, Allocator};
pub use commission::{CommissionAccrual, ReconcileReport, commission_amount};
pub use error::PurchaseError;
pub use facade::{CredentialSecret, PurchaseService, Receipt};
pub use storage::{BillingDatabase, DatabaseError};
