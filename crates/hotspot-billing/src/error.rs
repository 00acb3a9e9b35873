//! Typed purchase failures.

use hotspot_core::db::DatabaseError;

/// Every way a purchase-path operation can fail.
///
/// Apart from `InternalInconsistency`, a returned error means no side
/// effects remain: no claim outstanding and no debit.
#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("Insufficient funds: balance {balance}, price {price}")]
    InsufficientFunds { balance: i64, price: i64 },

    #[error("No credential available for plan {plan_id} at location {location_id}")]
    PoolExhausted {
        location_id: String,
        plan_id: String,
    },

    #[error("Plan unavailable: {0}")]
    PlanUnavailable(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    /// The store could not be reached or a statement failed. Safe to retry.
    #[error("Store error: {0}")]
    TransientStore(String),

    /// A claim could not be matched to a purchase or compensated.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("A purchase for this user is already in progress")]
    Busy,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Purchase not found: {0}")]
    PurchaseNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PurchaseError {
    /// Stable machine-readable code for API responses and logs.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::PlanUnavailable(_) => "plan_unavailable",
            Self::LocationUnavailable(_) => "location_unavailable",
            Self::TransientStore(_) => "transient_store_error",
            Self::InternalInconsistency(_) => "internal_inconsistency",
            Self::Busy => "busy",
            Self::InvalidRequest(_) => "invalid_request",
            Self::PurchaseNotFound(_) => "purchase_not_found",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<DatabaseError> for PurchaseError {
    fn from(e: DatabaseError) -> Self {
        Self::TransientStore(e.to_string())
    }
}
