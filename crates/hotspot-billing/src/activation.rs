//! Deferred activation: `pending -> active`, with `expired` derived from time.

use tracing::info;

use crate::error::PurchaseError;
use crate::storage::{BillingDatabase, Purchase};

/// Start the access window of a pending purchase owned by `user_id`.
///
/// Stamps `activated_at = now` and `expires_at = now + duration`. The
/// transition happens once; activating again is `InvalidState`.
pub async fn activate(
    db: &BillingDatabase,
    purchase_id: &str,
    user_id: &str,
    now: i64,
) -> Result<Purchase, PurchaseError> {
    if let Some(purchase) = db.activate_purchase(purchase_id, user_id, now).await? {
        info!(
            purchase_id,
            user_id,
            expires_at = purchase.expires_at,
            "Purchase activated"
        );
        return Ok(purchase);
    }

    match db.get_purchase(purchase_id).await? {
        Some(existing) if existing.user_id == user_id => Err(PurchaseError::InvalidState(format!(
            "purchase {purchase_id} is {:?}, not pending",
            existing.status_at(now)
        ))),
        _ => Err(PurchaseError::PurchaseNotFound(purchase_id.to_string())),
    }
}
