//! Referral earnings queries.

use hotspot_core::db::unix_timestamp;

use super::db::{BillingDatabase, DatabaseError};
use super::models::{Purchase, ReferralEarning, ReferralSummary};

/// Parameters for recording a referral earning.
pub struct EarningParams<'a> {
    pub purchase_id: &'a str,
    pub referrer_id: &'a str,
    pub referred_user_id: &'a str,
    pub amount: i64,
    pub rate_bps: u32,
}

impl BillingDatabase {
    /// Record an earning for a purchase.
    ///
    /// Keyed by `purchase_id`: returns `false` and changes nothing if the
    /// purchase already has an earning.
    pub async fn insert_earning(&self, params: &EarningParams<'_>) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO referral_earnings (purchase_id, referrer_id, referred_user_id, amount, rate_bps, status, created_at) \
             VALUES (?, ?, ?, ?, ?, 'earned', ?) ON CONFLICT(purchase_id) DO NOTHING",
        )
        .bind(params.purchase_id)
        .bind(params.referrer_id)
        .bind(params.referred_user_id)
        .bind(params.amount)
        .bind(params.rate_bps)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Earnings credited to a referrer, newest first.
    pub async fn list_earnings(
        &self,
        referrer_id: &str,
    ) -> Result<Vec<ReferralEarning>, DatabaseError> {
        let earnings = sqlx::query_as::<_, ReferralEarning>(
            "SELECT * FROM referral_earnings WHERE referrer_id = ? ORDER BY created_at DESC, purchase_id",
        )
        .bind(referrer_id)
        .fetch_all(self.pool())
        .await?;

        Ok(earnings)
    }

    /// Totals for a referrer, computed from the earnings table alone.
    pub async fn referral_summary(
        &self,
        referrer_id: &str,
    ) -> Result<ReferralSummary, DatabaseError> {
        let (referrals, earned, paid): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(DISTINCT referred_user_id), \
             COALESCE(SUM(CASE WHEN status = 'earned' THEN amount END), 0), \
             COALESCE(SUM(CASE WHEN status = 'paid' THEN amount END), 0) \
             FROM referral_earnings WHERE referrer_id = ?",
        )
        .bind(referrer_id)
        .fetch_one(self.pool())
        .await?;

        Ok(ReferralSummary {
            referrer_id: referrer_id.to_string(),
            referrals,
            earned,
            paid,
        })
    }

    /// Mark every outstanding earning of a referrer as paid.
    pub async fn mark_earnings_paid(&self, referrer_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE referral_earnings SET status = 'paid', paid_at = ? WHERE referrer_id = ? AND status = 'earned'",
        )
        .bind(unix_timestamp())
        .bind(referrer_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Purchases by referred users that have no earning recorded yet.
    pub async fn purchases_missing_earnings(
        &self,
        limit: u32,
    ) -> Result<Vec<Purchase>, DatabaseError> {
        let purchases = sqlx::query_as::<_, Purchase>(
            "SELECT p.* FROM purchases p \
             JOIN users u ON u.id = p.user_id \
             LEFT JOIN referral_earnings e ON e.purchase_id = p.id \
             WHERE u.referrer_id IS NOT NULL AND e.purchase_id IS NULL \
             ORDER BY p.purchased_at, p.id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(purchases)
    }
}
