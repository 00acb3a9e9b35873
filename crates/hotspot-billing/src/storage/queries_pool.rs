//! Credential pool queries: claim, compensation, bulk import, and stats.

use hotspot_core::db::unix_timestamp;

use super::db::{BillingDatabase, DatabaseError};
use super::models::{Credential, ImportReport, NewCredential, PoolStats};

/// Claim one available credential in a single conditional update.
///
/// The outer `status = 'available'` re-check makes this a compare-and-swap:
/// of any number of concurrent callers, exactly one transitions a given row.
const CLAIM_SQL: &str = "UPDATE credentials SET status = 'claimed', claimed_by = ?, claimed_at = ? \
     WHERE id = (SELECT id FROM credentials WHERE location_id = ? AND plan_id = ? AND status = 'available' LIMIT 1) \
     AND status = 'available' RETURNING *";

/// Return a claim to the pool, but only if no purchase references it.
const RELEASE_SQL: &str = "UPDATE credentials SET status = 'available', claimed_by = NULL, claimed_at = NULL \
     WHERE id = ? AND status = 'claimed' AND claimed_by = ? \
     AND NOT EXISTS (SELECT 1 FROM purchases WHERE credential_id = credentials.id)";

impl BillingDatabase {
    /// Atomically claim an available credential for `user_id`.
    ///
    /// Returns `None` when the (location, plan) pool has nothing available.
    /// Which credential is picked among several available is unspecified.
    pub async fn claim_credential(
        &self,
        location_id: &str,
        plan_id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<Option<Credential>, DatabaseError> {
        let credential = sqlx::query_as::<_, Credential>(CLAIM_SQL)
            .bind(user_id)
            .bind(now)
            .bind(location_id)
            .bind(plan_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(credential)
    }

    /// Compensating release of a claim held by `user_id`.
    ///
    /// Returns `false` if the credential is not claimed by that user or a
    /// purchase already references it.
    pub async fn release_claim(
        &self,
        credential_id: &str,
        user_id: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(RELEASE_SQL)
            .bind(credential_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a credential by ID.
    pub async fn get_credential(&self, id: &str) -> Result<Credential, DatabaseError> {
        sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Credential {id}")))
    }

    /// Insert a batch of credentials into the (location, plan) pool.
    ///
    /// Rows whose `(location_id, username)` already exists, in the pool or
    /// earlier in the same batch, are rejected; blank usernames or passwords
    /// are rejected too. The whole batch commits in one transaction.
    pub async fn import_credentials(
        &self,
        location_id: &str,
        plan_id: &str,
        credentials: &[NewCredential],
    ) -> Result<ImportReport, DatabaseError> {
        let now = unix_timestamp();
        let mut report = ImportReport::default();
        let mut tx = self.pool().begin().await?;

        for credential in credentials {
            let username = credential.username.trim();
            if username.is_empty() || credential.password.is_empty() {
                report.rejected.push(credential.username.clone());
                continue;
            }

            let result = sqlx::query(
                "INSERT INTO credentials (id, location_id, plan_id, username, password, status, created_at) \
                 VALUES (?, ?, ?, ?, ?, 'available', ?) ON CONFLICT(location_id, username) DO NOTHING",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(location_id)
            .bind(plan_id)
            .bind(username)
            .bind(&credential.password)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                report.rejected.push(username.to_string());
            } else {
                report.inserted += 1;
            }
        }

        tx.commit().await?;

        Ok(report)
    }

    /// Disable an available credential. Claimed credentials cannot be disabled.
    pub async fn disable_credential(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE credentials SET status = 'disabled' WHERE id = ? AND status = 'available'",
        )
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count credentials in a (location, plan) pool by status.
    pub async fn pool_stats(
        &self,
        location_id: &str,
        plan_id: &str,
    ) -> Result<PoolStats, DatabaseError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM credentials WHERE location_id = ? AND plan_id = ? GROUP BY status",
        )
        .bind(location_id)
        .bind(plan_id)
        .fetch_all(self.pool())
        .await?;

        let mut stats = PoolStats::default();
        for (status, count) in rows {
            match status.as_str() {
                "available" => stats.available = count,
                "claimed" => stats.claimed = count,
                "disabled" => stats.disabled = count,
                _ => {}
            }
        }

        Ok(stats)
    }
}
