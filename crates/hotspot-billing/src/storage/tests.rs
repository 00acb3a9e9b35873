//! Storage layer tests for hotspot billing.

use super::db::BillingDatabase;
use super::models::*;
use super::queries_audit::CLAIM_GRACE_SECS;
use super::queries_catalog::PlanParams;
use super::queries_referral::EarningParams;
use hotspot_core::db::unix_timestamp;

async fn test_db() -> BillingDatabase {
    BillingDatabase::open_in_memory().await.unwrap()
}

async fn seed_pool(db: &BillingDatabase, usernames: &[&str]) {
    db.upsert_location("lagos", "Lagos Hub", true).await.unwrap();
    db.upsert_plan(&PlanParams {
        id: "daily",
        name: "Daily",
        price: 500,
        duration_hours: 24,
        deferred_activation: false,
        active: true,
    })
    .await
    .unwrap();
    let batch: Vec<NewCredential> = usernames
        .iter()
        .map(|u| NewCredential {
            username: (*u).to_string(),
            password: format!("{u}-pw"),
        })
        .collect();
    db.import_credentials("lagos", "daily", &batch).await.unwrap();
}

fn new_purchase(id: &str, user_id: &str, credential_id: &str, amount: i64) -> NewPurchase {
    let now = unix_timestamp();
    NewPurchase {
        id: id.to_string(),
        user_id: user_id.to_string(),
        plan_id: "daily".to_string(),
        location_id: "lagos".to_string(),
        credential_id: credential_id.to_string(),
        amount,
        duration_hours: 24,
        purchased_at: now,
        expires_at: Some(now + 24 * 3600),
    }
}

// === Catalog tests ===

#[tokio::test]
async fn register_user_keeps_first_referrer() {
    let db = test_db().await;
    db.register_user("ref", None).await.unwrap();
    db.register_user("other", None).await.unwrap();
    db.register_user("u1", Some("ref")).await.unwrap();
    db.register_user("u1", Some("other")).await.unwrap();

    assert_eq!(db.referrer_of("u1").await.unwrap().as_deref(), Some("ref"));
    assert_eq!(db.referrer_of("ref").await.unwrap(), None);
    assert_eq!(db.referrer_of("ghost").await.unwrap(), None);
}

#[tokio::test]
async fn self_referral_is_rejected() {
    let db = test_db().await;
    assert!(db.register_user("u1", Some("u1")).await.is_err());
}

#[tokio::test]
async fn upsert_plan_updates_price() {
    let db = test_db().await;
    let mut params = PlanParams {
        id: "weekly",
        name: "Weekly",
        price: 2_000,
        duration_hours: 168,
        deferred_activation: true,
        active: true,
    };
    db.upsert_plan(&params).await.unwrap();
    params.price = 2_500;
    let plan = db.upsert_plan(&params).await.unwrap();

    assert_eq!(plan.price, 2_500);
    assert!(plan.deferred_activation);
    assert_eq!(plan.duration_secs(), 168 * 3600);
    assert!(db.get_plan("missing").await.unwrap().is_none());
}

// === Wallet / funding tests ===

#[tokio::test]
async fn missing_wallet_reads_zero() {
    let db = test_db().await;
    assert_eq!(db.wallet_balance("nobody").await.unwrap(), 0);
}

#[tokio::test]
async fn funding_is_idempotent_by_reference() {
    let db = test_db().await;

    let first = db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    assert_eq!(first, FundingOutcome::Applied { balance: 1_000 });

    let replay = db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    assert_eq!(replay, FundingOutcome::Duplicate);

    let second = db.apply_funding("txn-2", "u1", 250).await.unwrap();
    assert_eq!(second, FundingOutcome::Applied { balance: 1_250 });

    let entries = db.ledger_entries("u1").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.kind == "funding"));
}

#[tokio::test]
async fn non_positive_funding_is_rejected() {
    let db = test_db().await;
    assert!(db.apply_funding("txn-0", "u1", 0).await.is_err());
    assert!(db.apply_funding("txn-neg", "u1", -5).await.is_err());
    assert_eq!(db.wallet_balance("u1").await.unwrap(), 0);
}

// === Credential pool tests ===

#[tokio::test]
async fn import_rejects_duplicate_usernames() {
    let db = test_db().await;
    seed_pool(&db, &["alpha", "beta"]).await;

    let report = db
        .import_credentials(
            "lagos",
            "daily",
            &[
                NewCredential { username: "beta".into(), password: "x".into() },
                NewCredential { username: "gamma".into(), password: "x".into() },
                NewCredential { username: "gamma".into(), password: "y".into() },
                NewCredential { username: " ".into(), password: "x".into() },
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.inserted, 1);
    assert_eq!(report.rejected, vec!["beta", "gamma", " "]);

    let stats = db.pool_stats("lagos", "daily").await.unwrap();
    assert_eq!(stats.available, 3);
}

#[tokio::test]
async fn same_username_allowed_at_another_location() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;

    let report = db
        .import_credentials(
            "abuja",
            "daily",
            &[NewCredential { username: "alpha".into(), password: "x".into() }],
        )
        .await
        .unwrap();
    assert_eq!(report.inserted, 1);
}

#[tokio::test]
async fn claim_takes_each_credential_once() {
    let db = test_db().await;
    seed_pool(&db, &["alpha", "beta"]).await;
    let now = unix_timestamp();

    let first = db.claim_credential("lagos", "daily", "u1", now).await.unwrap().unwrap();
    let second = db.claim_credential("lagos", "daily", "u2", now).await.unwrap().unwrap();
    let third = db.claim_credential("lagos", "daily", "u3", now).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.status, CredentialStatus::Claimed);
    assert_eq!(first.claimed_by.as_deref(), Some("u1"));
    assert_eq!(first.claimed_at, Some(now));
    assert!(third.is_none());
}

#[tokio::test]
async fn claim_respects_pool_key() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    let now = unix_timestamp();

    assert!(db.claim_credential("lagos", "weekly", "u1", now).await.unwrap().is_none());
    assert!(db.claim_credential("abuja", "daily", "u1", now).await.unwrap().is_none());
}

#[tokio::test]
async fn release_only_by_claimant_without_purchase() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();

    assert!(!db.release_claim(&claimed.id, "u2").await.unwrap());
    assert!(db.release_claim(&claimed.id, "u1").await.unwrap());

    let credential = db.get_credential(&claimed.id).await.unwrap();
    assert_eq!(credential.status, CredentialStatus::Available);
    assert!(credential.claimed_by.is_none());
    assert!(credential.claimed_at.is_none());
}

#[tokio::test]
async fn release_refuses_purchased_credential() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();
    db.debit_for_purchase(&new_purchase("p1", "u1", &claimed.id, 500))
        .await
        .unwrap();

    assert!(!db.release_claim(&claimed.id, "u1").await.unwrap());
    assert!(!db.release_orphaned_claim(&claimed.id).await.unwrap());
}

#[tokio::test]
async fn disable_only_from_available() {
    let db = test_db().await;
    seed_pool(&db, &["alpha", "beta"]).await;
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();

    assert!(!db.disable_credential(&claimed.id).await.unwrap());

    let stats = db.pool_stats("lagos", "daily").await.unwrap();
    assert_eq!(stats.available, 1);
    let other: String = sqlx::query_scalar("SELECT id FROM credentials WHERE status = 'available'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert!(db.disable_credential(&other).await.unwrap());

    let stats = db.pool_stats("lagos", "daily").await.unwrap();
    assert_eq!(stats, PoolStats { available: 0, claimed: 1, disabled: 1 });
    assert!(db.claim_credential("lagos", "daily", "u2", unix_timestamp()).await.unwrap().is_none());
}

// === Debit transaction tests ===

#[tokio::test]
async fn debit_writes_purchase_and_ledger_entry() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();

    let outcome = db
        .debit_for_purchase(&new_purchase("p1", "u1", &claimed.id, 500))
        .await
        .unwrap();
    let DebitOutcome::Committed(purchase) = outcome else {
        panic!("expected committed debit");
    };

    assert_eq!(purchase.status, PurchaseStatus::Active);
    assert_eq!(purchase.activated_at, Some(purchase.purchased_at));
    assert_eq!(db.wallet_balance("u1").await.unwrap(), 500);

    let entries = db.ledger_entries("u1").await.unwrap();
    assert_eq!(entries.last().unwrap().amount, -500);
    assert_eq!(entries.last().unwrap().reference, "p1");
}

#[tokio::test]
async fn debit_without_funds_writes_nothing() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u1", 300).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();

    let outcome = db
        .debit_for_purchase(&new_purchase("p1", "u1", &claimed.id, 500))
        .await
        .unwrap();

    assert!(matches!(outcome, DebitOutcome::InsufficientFunds { balance: 300 }));
    assert_eq!(db.wallet_balance("u1").await.unwrap(), 300);
    assert!(db.get_purchase("p1").await.unwrap().is_none());
}

#[tokio::test]
async fn debit_twice_for_same_credential_fails() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u1", 2_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();

    db.debit_for_purchase(&new_purchase("p1", "u1", &claimed.id, 500))
        .await
        .unwrap();
    let second = db
        .debit_for_purchase(&new_purchase("p2", "u1", &claimed.id, 500))
        .await;

    assert!(second.is_err());
    assert_eq!(db.wallet_balance("u1").await.unwrap(), 1_500);
}

#[tokio::test]
async fn deferred_purchase_is_pending_until_activated() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();
    let mut pending = new_purchase("p1", "u1", &claimed.id, 500);
    pending.expires_at = None;
    db.debit_for_purchase(&pending).await.unwrap();

    let stored = db.get_purchase("p1").await.unwrap().unwrap();
    assert_eq!(stored.status, PurchaseStatus::Pending);
    assert!(stored.expires_at.is_none());

    assert!(db.activate_purchase("p1", "u2", 10_000).await.unwrap().is_none());

    let active = db.activate_purchase("p1", "u1", 10_000).await.unwrap().unwrap();
    assert_eq!(active.status, PurchaseStatus::Active);
    assert_eq!(active.activated_at, Some(10_000));
    assert_eq!(active.expires_at, Some(10_000 + 24 * 3600));

    assert!(db.activate_purchase("p1", "u1", 20_000).await.unwrap().is_none());
}

#[tokio::test]
async fn purchase_with_credential_requires_owner() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();
    db.debit_for_purchase(&new_purchase("p1", "u1", &claimed.id, 500))
        .await
        .unwrap();

    let row = db.get_purchase_with_credential("p1", "u1").await.unwrap().unwrap();
    assert_eq!(row.username, "alpha");
    assert_eq!(row.password, "alpha-pw");
    assert_eq!(row.purchase.credential_id, claimed.id);

    assert!(db.get_purchase_with_credential("p1", "u2").await.unwrap().is_none());
    assert_eq!(db.list_purchases("u1", 10, 0).await.unwrap().len(), 1);
}

// === Referral tests ===

#[tokio::test]
async fn earning_is_unique_per_purchase() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.register_user("ref", None).await.unwrap();
    db.register_user("u1", Some("ref")).await.unwrap();
    db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();
    db.debit_for_purchase(&new_purchase("p1", "u1", &claimed.id, 500))
        .await
        .unwrap();

    assert_eq!(db.purchases_missing_earnings(10).await.unwrap().len(), 1);

    let params = EarningParams {
        purchase_id: "p1",
        referrer_id: "ref",
        referred_user_id: "u1",
        amount: 50,
        rate_bps: 1_000,
    };
    assert!(db.insert_earning(&params).await.unwrap());
    assert!(!db.insert_earning(&params).await.unwrap());
    assert!(db.purchases_missing_earnings(10).await.unwrap().is_empty());

    let summary = db.referral_summary("ref").await.unwrap();
    assert_eq!(summary.earned, 50);
    assert_eq!(summary.referrals, 1);

    assert_eq!(db.mark_earnings_paid("ref").await.unwrap(), 1);
    let summary = db.referral_summary("ref").await.unwrap();
    assert_eq!((summary.earned, summary.paid), (0, 50));
    assert_eq!(db.list_earnings("ref").await.unwrap()[0].status, EarningStatus::Paid);
}

#[tokio::test]
async fn summary_for_unknown_referrer_is_zero() {
    let db = test_db().await;
    let summary = db.referral_summary("nobody").await.unwrap();
    assert_eq!(summary.earned, 0);
    assert_eq!(summary.paid, 0);
    assert_eq!(summary.referrals, 0);
}

// === Audit tests ===

#[tokio::test]
async fn audit_reports_orphaned_claim() {
    let db = test_db().await;
    seed_pool(&db, &["alpha", "beta"]).await;
    db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    let now = unix_timestamp();

    let purchased = db.claim_credential("lagos", "daily", "u1", now).await.unwrap().unwrap();
    db.debit_for_purchase(&new_purchase("p1", "u1", &purchased.id, 500))
        .await
        .unwrap();
    let stale = now - CLAIM_GRACE_SECS - 1;
    let orphan = db.claim_credential("lagos", "daily", "u2", stale).await.unwrap().unwrap();

    let audit = db.audit_claims().await.unwrap();
    assert_eq!(audit.orphaned_claims, vec![orphan.id.clone()]);
    assert!(audit.unbacked_purchases.is_empty());
    assert!(!audit.is_clean());

    assert!(db.release_orphaned_claim(&orphan.id).await.unwrap());
    assert!(db.audit_claims().await.unwrap().is_clean());
}

#[tokio::test]
async fn fresh_claim_is_not_an_orphan() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();

    assert!(db.audit_claims().await.unwrap().is_clean());
    assert!(!db.release_orphaned_claim(&claimed.id).await.unwrap());
    assert_eq!(
        db.get_credential(&claimed.id).await.unwrap().status,
        CredentialStatus::Claimed
    );
}

#[tokio::test]
async fn debit_after_claim_released_writes_nothing() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u1", 1_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp() - CLAIM_GRACE_SECS - 1)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(db.audit_claims().await.unwrap().orphaned_claims, vec![claimed.id.clone()]);
    assert!(db.release_orphaned_claim(&claimed.id).await.unwrap());

    let outcome = db
        .debit_for_purchase(&new_purchase("p1", "u1", &claimed.id, 500))
        .await
        .unwrap();

    assert!(matches!(outcome, DebitOutcome::ClaimLost));
    assert_eq!(db.wallet_balance("u1").await.unwrap(), 1_000);
    assert!(db.get_purchase("p1").await.unwrap().is_none());
    assert_eq!(
        db.get_credential(&claimed.id).await.unwrap().status,
        CredentialStatus::Available
    );
    assert!(db.audit_claims().await.unwrap().is_clean());
}

#[tokio::test]
async fn debit_against_another_users_claim_writes_nothing() {
    let db = test_db().await;
    seed_pool(&db, &["alpha"]).await;
    db.apply_funding("txn-1", "u2", 1_000).await.unwrap();
    let claimed = db
        .claim_credential("lagos", "daily", "u1", unix_timestamp())
        .await
        .unwrap()
        .unwrap();

    let outcome = db
        .debit_for_purchase(&new_purchase("p1", "u2", &claimed.id, 500))
        .await
        .unwrap();

    assert!(matches!(outcome, DebitOutcome::ClaimLost));
    assert_eq!(db.wallet_balance("u2").await.unwrap(), 1_000);
}
