//! Data models for hotspot billing storage.
//!
//! Amounts are integer minor units; timestamps are Unix seconds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub referrer_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub duration_hours: i64,
    pub deferred_activation: bool,
    pub active: bool,
    pub created_at: i64,
}

impl Plan {
    pub const fn duration_secs(&self) -> i64 {
        self.duration_hours * 3600
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub user_id: String,
    pub balance: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub amount: i64,
    pub reference: String,
    pub created_at: i64,
}

/// Credential lifecycle: `available -> claimed` once, or `available -> disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Available,
    Claimed,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Credential {
    pub id: String,
    pub location_id: String,
    pub plan_id: String,
    pub username: String,
    pub password: String,
    pub status: CredentialStatus,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
}

/// Stored purchase state. `Expired` is never written; see [`Purchase::status_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub location_id: String,
    pub credential_id: String,
    pub amount: i64,
    pub duration_hours: i64,
    pub status: PurchaseStatus,
    pub purchased_at: i64,
    pub activated_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl Purchase {
    /// Effective status at `now`: an active purchase past `expires_at` is expired.
    pub fn status_at(&self, now: i64) -> PurchaseStatus {
        match (self.status, self.expires_at) {
            (PurchaseStatus::Active, Some(expires_at)) if now >= expires_at => {
                PurchaseStatus::Expired
            }
            (status, _) => status,
        }
    }
}

/// A purchase about to be written by the debit transaction.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub location_id: String,
    pub credential_id: String,
    pub amount: i64,
    pub duration_hours: i64,
    pub purchased_at: i64,
    /// `None` for deferred activation.
    pub expires_at: Option<i64>,
}

/// Purchase joined with the credential it owns.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PurchaseWithCredential {
    #[sqlx(flatten)]
    pub purchase: Purchase,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EarningStatus {
    Earned,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReferralEarning {
    pub purchase_id: String,
    pub referrer_id: String,
    pub referred_user_id: String,
    pub amount: i64,
    pub rate_bps: i64,
    pub status: EarningStatus,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

/// Totals for one referrer, read from the earnings ledger only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralSummary {
    pub referrer_id: String,
    pub referrals: i64,
    pub earned: i64,
    pub paid: i64,
}

/// Result of the debit transaction.
#[derive(Debug, Clone)]
pub enum DebitOutcome {
    Committed(Purchase),
    /// The balance moved below the price after the pre-check; nothing was written.
    InsufficientFunds { balance: i64 },
    /// The credential is no longer claimed by the buyer; nothing was written.
    ClaimLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingOutcome {
    Applied { balance: i64 },
    Duplicate,
}

/// One credential row as delivered by the bulk import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCredential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub inserted: usize,
    /// Usernames dropped as duplicates of the pool or of the batch.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub available: i64,
    pub claimed: i64,
    pub disabled: i64,
}

/// Rows violating the claim/purchase 1:1 relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAudit {
    /// Claimed credentials with no purchase referencing them.
    pub orphaned_claims: Vec<String>,
    /// Purchases whose credential is not claimed by the purchaser.
    pub unbacked_purchases: Vec<String>,
}

impl ClaimAudit {
    pub fn is_clean(&self) -> bool {
        self.orphaned_claims.is_empty() && self.unbacked_purchases.is_empty()
    }
}
