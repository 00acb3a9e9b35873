//! Consistency checks between the credential pool and the purchase ledger.

use hotspot_core::db::unix_timestamp;
use tracing::warn;

use super::db::{BillingDatabase, DatabaseError};
use super::models::ClaimAudit;

/// Claims younger than this may still belong to an allocation in flight and
/// are never reported or released as orphans.
pub const CLAIM_GRACE_SECS: i64 = 120;

impl BillingDatabase {
    /// Find rows that break the one-claim-one-purchase relationship.
    pub async fn audit_claims(&self) -> Result<ClaimAudit, DatabaseError> {
        let orphaned_claims: Vec<String> = sqlx::query_scalar(
            "SELECT c.id FROM credentials c LEFT JOIN purchases p ON p.credential_id = c.id \
             WHERE c.status = 'claimed' AND p.id IS NULL AND c.claimed_at <= ? \
             ORDER BY c.claimed_at, c.id",
        )
        .bind(unix_timestamp() - CLAIM_GRACE_SECS)
        .fetch_all(self.pool())
        .await?;

        let unbacked_purchases: Vec<String> = sqlx::query_scalar(
            "SELECT p.id FROM purchases p JOIN credentials c ON c.id = p.credential_id \
             WHERE c.status != 'claimed' OR c.claimed_by IS NOT p.user_id ORDER BY p.purchased_at, p.id",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(ClaimAudit {
            orphaned_claims,
            unbacked_purchases,
        })
    }

    /// Operator action: free a claimed credential that no purchase references.
    ///
    /// Returns `false` if the credential is not claimed, a purchase owns it,
    /// or the claim is younger than [`CLAIM_GRACE_SECS`].
    pub async fn release_orphaned_claim(&self, credential_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE credentials SET status = 'available', claimed_by = NULL, claimed_at = NULL \
             WHERE id = ? AND status = 'claimed' AND claimed_at <= ? \
             AND NOT EXISTS (SELECT 1 FROM purchases WHERE credential_id = credentials.id)",
        )
        .bind(credential_id)
        .bind(unix_timestamp() - CLAIM_GRACE_SECS)
        .execute(self.pool())
        .await?;

        let released = result.rows_affected() > 0;
        if released {
            warn!(credential_id, "Orphaned claim released by operator");
        }

        Ok(released)
    }
}
