//! Referral commission accrual.
//!
//! Runs after a purchase has committed and never affects its outcome.
//! Earnings are keyed by purchase id, so accrual is safe to repeat: the
//! inline attempt and the reconciliation pass can both run for the same
//! purchase and exactly one earning results.

use tracing::{info, warn};

use hotspot_core::db::unix_timestamp;

use crate::storage::{
    BillingDatabase, DatabaseError, EarningParams, EarningStatus, Purchase, ReferralEarning,
    ReferralSummary,
};
use crate::store::{LedgerStore, UserDirectory};

const BPS_DENOMINATOR: i64 = 10_000;

/// Commission on `amount` at `rate_bps`, rounded down to the minor unit.
///
/// Computed in `i128`; a result beyond `i64` saturates.
pub fn commission_amount(amount: i64, rate_bps: u32) -> i64 {
    let commission = i128::from(amount) * i128::from(rate_bps) / i128::from(BPS_DENOMINATOR);
    i64::try_from(commission).unwrap_or(i64::MAX)
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub accrued: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct CommissionAccrual<S> {
    store: S,
    rate_bps: u32,
}

impl<S> CommissionAccrual<S>
where
    S: LedgerStore + UserDirectory,
{
    pub const fn new(store: S, rate_bps: u32) -> Self {
        Self { store, rate_bps }
    }

    pub const fn rate_bps(&self) -> u32 {
        self.rate_bps
    }

    /// Accrue commission for one purchase.
    ///
    /// Returns the earning when one was created now, `None` when the buyer
    /// has no referrer or the earning already exists.
    pub async fn accrue(&self, purchase: &Purchase) -> Result<Option<ReferralEarning>, DatabaseError> {
        let Some(referrer_id) = self.store.referrer(&purchase.user_id).await? else {
            return Ok(None);
        };

        let amount = commission_amount(purchase.amount, self.rate_bps);
        let params = EarningParams {
            purchase_id: &purchase.id,
            referrer_id: &referrer_id,
            referred_user_id: &purchase.user_id,
            amount,
            rate_bps: self.rate_bps,
        };

        if !self.store.record_earning(&params).await? {
            return Ok(None);
        }

        info!(
            purchase_id = %purchase.id,
            referrer_id = %referrer_id,
            amount,
            "Referral commission accrued"
        );

        Ok(Some(ReferralEarning {
            purchase_id: purchase.id.clone(),
            referrer_id,
            referred_user_id: purchase.user_id.clone(),
            amount,
            rate_bps: i64::from(self.rate_bps),
            status: EarningStatus::Earned,
            created_at: unix_timestamp(),
            paid_at: None,
        }))
    }

    /// Accrue in the background. Failures are logged and left for
    /// [`CommissionAccrual::reconcile`].
    pub fn spawn_accrue(&self, purchase: Purchase) -> tokio::task::JoinHandle<()> {
        let accrual = self.clone();
        tokio::spawn(async move {
            if let Err(e) = accrual.accrue(&purchase).await {
                warn!(
                    purchase_id = %purchase.id,
                    error = %e,
                    "Commission accrual failed, left for reconciliation"
                );
            }
        })
    }
}

impl CommissionAccrual<BillingDatabase> {
    /// Accrue commission for purchases by referred users that have none yet.
    pub async fn reconcile(&self, limit: u32) -> Result<ReconcileReport, DatabaseError> {
        let pending = self.store.purchases_missing_earnings(limit).await?;
        let mut report = ReconcileReport {
            examined: pending.len(),
            ..ReconcileReport::default()
        };

        for purchase in &pending {
            match self.accrue(purchase).await {
                Ok(Some(_)) => report.accrued += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(purchase_id = %purchase.id, error = %e, "Reconciliation accrual failed");
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                accrued = report.accrued,
                failed = report.failed,
                "Commission reconciliation pass complete"
            );
        }

        Ok(report)
    }

    /// Earned and paid totals, taken from the earnings ledger only.
    pub async fn summary(&self, referrer_id: &str) -> Result<ReferralSummary, DatabaseError> {
        self.store.referral_summary(referrer_id).await
    }

    /// Record a payout: every `earned` row of the referrer becomes `paid`.
    pub async fn mark_paid(&self, referrer_id: &str) -> Result<u64, DatabaseError> {
        let paid = self.store.mark_earnings_paid(referrer_id).await?;
        if paid > 0 {
            info!(referrer_id, earnings = paid, "Referral earnings marked paid");
        }
        Ok(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_percent_of_five_hundred() {
        assert_eq!(commission_amount(500, 1_000), 50);
    }

    #[test]
    fn commission_rounds_down() {
        assert_eq!(commission_amount(999, 1_000), 99);
        assert_eq!(commission_amount(5, 1_000), 0);
    }

    #[test]
    fn large_amounts_do_not_overflow() {
        assert_eq!(commission_amount(i64::MAX, 1_000), i64::MAX / 10);
        assert_eq!(commission_amount(i64::MAX, 10_000), i64::MAX);
        assert_eq!(commission_amount(i64::MAX, u32::MAX), i64::MAX);
    }

    #[test]
    fn zero_rate_earns_nothing() {
        assert_eq!(commission_amount(10_000, 0), 0);
    }
}
