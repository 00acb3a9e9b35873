//! Ledger queries: wallets, funding events, purchases, and the debit transaction.

use hotspot_core::db::unix_timestamp;

use super::db::{BillingDatabase, DatabaseError};
use super::models::{
    DebitOutcome, FundingOutcome, LedgerEntry, NewPurchase, Purchase, PurchaseWithCredential,
};

const ENSURE_WALLET_SQL: &str =
    "INSERT INTO wallets (user_id, balance, updated_at) VALUES (?, 0, ?) ON CONFLICT(user_id) DO NOTHING";

const PURCHASE_WITH_CREDENTIAL_SQL: &str = "SELECT p.*, c.username, c.password FROM purchases p \
     JOIN credentials c ON c.id = p.credential_id WHERE p.id = ? AND p.user_id = ?";

impl BillingDatabase {
    // =========================================================================
    // Wallets
    // =========================================================================

    /// Current balance. A user without a wallet has a balance of zero.
    pub async fn wallet_balance(&self, user_id: &str) -> Result<i64, DatabaseError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(balance.unwrap_or(0))
    }

    /// Ledger entries for a user, oldest first.
    pub async fn ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(entries)
    }

    /// Credit a wallet from an external funding event.
    ///
    /// Idempotent by `external_ref`: a repeated delivery changes nothing and
    /// reports [`FundingOutcome::Duplicate`].
    pub async fn apply_funding(
        &self,
        external_ref: &str,
        user_id: &str,
        amount: i64,
    ) -> Result<FundingOutcome, DatabaseError> {
        if amount <= 0 {
            return Err(DatabaseError::Query(format!(
                "Funding amount must be positive, got {amount}"
            )));
        }

        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO funding_events (external_ref, user_id, amount, received_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(external_ref) DO NOTHING",
        )
        .bind(external_ref)
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(FundingOutcome::Duplicate);
        }

        sqlx::query(
            "INSERT INTO wallets (user_id, balance, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET balance = balance + excluded.balance, updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO ledger_entries (user_id, kind, amount, reference, created_at) VALUES (?, 'funding', ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(external_ref)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let balance: i64 = sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(FundingOutcome::Applied { balance })
    }

    // =========================================================================
    // Debit transaction
    // =========================================================================

    /// Debit the purchase amount and persist the purchase, atomically.
    ///
    /// The debit is conditional on `balance >= amount`, so the wallet can
    /// never go negative even if another purchase spent it since the caller
    /// read the balance. The buyer's claim on the credential is re-checked
    /// inside the transaction, so a claim released in the meantime yields
    /// [`DebitOutcome::ClaimLost`]. Status is `active` when `expires_at` is
    /// set and `pending` otherwise.
    pub async fn debit_for_purchase(
        &self,
        purchase: &NewPurchase,
    ) -> Result<DebitOutcome, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        // First statement is a write so the transaction holds the write lock
        // from the start.
        let held = sqlx::query(
            "UPDATE credentials SET claimed_at = claimed_at \
             WHERE id = ? AND status = 'claimed' AND claimed_by = ?",
        )
        .bind(&purchase.credential_id)
        .bind(&purchase.user_id)
        .execute(&mut *tx)
        .await?;

        if held.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(DebitOutcome::ClaimLost);
        }

        sqlx::query(ENSURE_WALLET_SQL)
            .bind(&purchase.user_id)
            .bind(purchase.purchased_at)
            .execute(&mut *tx)
            .await?;

        let debited = sqlx::query(
            "UPDATE wallets SET balance = balance - ?, updated_at = ? WHERE user_id = ? AND balance >= ?",
        )
        .bind(purchase.amount)
        .bind(purchase.purchased_at)
        .bind(&purchase.user_id)
        .bind(purchase.amount)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let balance: i64 = sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = ?")
                .bind(&purchase.user_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Ok(DebitOutcome::InsufficientFunds { balance });
        }

        let (status, activated_at) = match purchase.expires_at {
            Some(_) => ("active", Some(purchase.purchased_at)),
            None => ("pending", None),
        };

        sqlx::query(
            "INSERT INTO purchases (id, user_id, plan_id, location_id, credential_id, amount, duration_hours, \
             status, purchased_at, activated_at, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&purchase.id)
        .bind(&purchase.user_id)
        .bind(&purchase.plan_id)
        .bind(&purchase.location_id)
        .bind(&purchase.credential_id)
        .bind(purchase.amount)
        .bind(purchase.duration_hours)
        .bind(status)
        .bind(purchase.purchased_at)
        .bind(activated_at)
        .bind(purchase.expires_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO ledger_entries (user_id, kind, amount, reference, created_at) VALUES (?, 'purchase', ?, ?, ?)",
        )
        .bind(&purchase.user_id)
        .bind(-purchase.amount)
        .bind(&purchase.id)
        .bind(purchase.purchased_at)
        .execute(&mut *tx)
        .await?;

        let stored = sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ?")
            .bind(&purchase.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(DebitOutcome::Committed(stored))
    }

    // =========================================================================
    // Purchases
    // =========================================================================

    /// Get a purchase by ID.
    pub async fn get_purchase(&self, id: &str) -> Result<Option<Purchase>, DatabaseError> {
        let purchase = sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(purchase)
    }

    /// Get a purchase owned by `user_id` together with its credential secret.
    pub async fn get_purchase_with_credential(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<PurchaseWithCredential>, DatabaseError> {
        let row = sqlx::query_as::<_, PurchaseWithCredential>(PURCHASE_WITH_CREDENTIAL_SQL)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    /// List purchases for a user, newest first.
    pub async fn list_purchases(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Purchase>, DatabaseError> {
        let purchases = sqlx::query_as::<_, Purchase>(
            "SELECT * FROM purchases WHERE user_id = ? ORDER BY purchased_at DESC, id LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(purchases)
    }

    /// Start the clock on a pending purchase.
    ///
    /// Returns `None` when no pending purchase with that ID belongs to the
    /// user; the caller decides whether that means missing or already active.
    pub async fn activate_purchase(
        &self,
        id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<Option<Purchase>, DatabaseError> {
        let purchase = sqlx::query_as::<_, Purchase>(
            "UPDATE purchases SET status = 'active', activated_at = ?, expires_at = ? + duration_hours * 3600 \
             WHERE id = ? AND user_id = ? AND status = 'pending' RETURNING *",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(purchase)
    }
}
