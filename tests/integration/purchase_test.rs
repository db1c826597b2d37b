use chrono::Duration;
use storehelper::{
    models::{
        purchase::{PurchaseOption, PurchaseResult},
        transaction::VerificationError,
    },
    ScriptedPurchase, StoreError,
};
use uuid::Uuid;

use super::*;

fn monthly() -> Product {
    product(MONTHLY, ProductKind::AutoRenewable, Some((PeriodUnit::Month, 1)))
}

#[tokio::test]
async fn test_successful_purchase_is_finished_once() {
    let (sandbox, service) = setup(&[MONTHLY]);

    let result = service.purchase_default(&monthly()).await.unwrap();

    let transaction = match result {
        PurchaseResult::Success(transaction) => transaction,
        other => panic!("expected success, got {:?}", other),
    };
    assert_eq!(transaction.product_id, MONTHLY);
    assert_eq!(
        transaction.expiration_date,
        Some(Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap())
    );
    assert_eq!(sandbox.finished(), vec![transaction.id]);
}

#[tokio::test]
async fn test_purchase_options_reach_the_authority() {
    let (_sandbox, service) = setup(&[MONTHLY]);
    let token = Uuid::new_v4();

    let result = service
        .purchase(
            &monthly(),
            &[
                PurchaseOption::Quantity(3),
                PurchaseOption::AppAccountToken(token),
            ],
        )
        .await
        .unwrap();

    let transaction = result.transaction().expect("purchase should carry a transaction");
    assert_eq!(transaction.quantity, 3);
    assert_eq!(transaction.app_account_token, Some(token));
}

#[tokio::test]
async fn test_expired_purchase_is_validity_failure() {
    let (sandbox, service) = setup(&[MONTHLY]);
    sandbox.script_purchase(
        MONTHLY,
        ScriptedPurchase::CompleteWith {
            expiration_date: Some(now() - Duration::seconds(1)),
            revocation_date: None,
        },
    );

    let result = service.purchase_default(&monthly()).await.unwrap();

    let transaction = match result {
        PurchaseResult::ValidityFailed(transaction) => transaction,
        other => panic!("expected validity failure, got {:?}", other),
    };
    // Verified transactions are acknowledged even when no longer valid
    assert_eq!(sandbox.finished(), vec![transaction.id]);
}

#[tokio::test]
async fn test_expiring_exactly_now_is_validity_failure() {
    let (sandbox, service) = setup(&[MONTHLY]);
    sandbox.script_purchase(
        MONTHLY,
        ScriptedPurchase::CompleteWith {
            expiration_date: Some(now()),
            revocation_date: None,
        },
    );

    let result = service.purchase_default(&monthly()).await.unwrap();
    assert!(matches!(result, PurchaseResult::ValidityFailed(_)));
}

#[tokio::test]
async fn test_revoked_purchase_is_validity_failure() {
    let (sandbox, service) = setup(&[MONTHLY]);
    sandbox.script_purchase(
        MONTHLY,
        ScriptedPurchase::CompleteWith {
            expiration_date: None,
            revocation_date: Some(now() - Duration::hours(1)),
        },
    );

    let result = service.purchase_default(&monthly()).await.unwrap();
    assert!(matches!(result, PurchaseResult::ValidityFailed(_)));
}

#[tokio::test]
async fn test_unverified_purchase_is_never_finished() {
    let (sandbox, service) = setup(&[MONTHLY]);
    sandbox.script_purchase(
        MONTHLY,
        ScriptedPurchase::CompleteUnverified(VerificationError::InvalidCertificateChain),
    );

    let result = service.purchase_default(&monthly()).await.unwrap();

    assert!(
        matches!(result, PurchaseResult::VerificationFailed { .. }),
        "got {:?}",
        result
    );
    assert!(sandbox.finished().is_empty());
}

#[tokio::test]
async fn test_outcome_classification_table() {
    let cases = [
        (ScriptedPurchase::Pending, "pending"),
        (ScriptedPurchase::Cancel, "cancelled"),
        (
            ScriptedPurchase::Unrecognized("deferred".to_string()),
            "unknown",
        ),
        (
            ScriptedPurchase::Fail("store connection lost".to_string()),
            "verification_failed",
        ),
    ];

    for (scripted, expected) in cases {
        let (sandbox, service) = setup(&[MONTHLY]);
        sandbox.script_purchase(MONTHLY, scripted.clone());

        let result = service.purchase_default(&monthly()).await.unwrap();

        assert_eq!(result.as_str(), expected, "scripted {:?}", scripted);
        assert!(result.transaction().is_none());
        assert!(sandbox.finished().is_empty(), "scripted {:?}", scripted);
    }
}

#[tokio::test]
async fn test_unsupported_platform_is_hard_failure() {
    let mut config = test_config(&[MONTHLY]);
    config.sandbox.supports_purchase = false;
    let (sandbox, service) = setup_with(&config);

    let result = service.purchase_default(&monthly()).await;

    assert!(matches!(result, Err(StoreError::UnsupportedPlatform(_))));
    assert!(sandbox.finished().is_empty());
}

#[tokio::test]
async fn test_finalize_unverified_fails_without_finishing() {
    let (sandbox, service) = setup(&[MONTHLY]);
    let payload = transaction(7, MONTHLY, None, None);

    let result = service.finalize(unverified(payload.clone())).await;

    match result {
        Err(StoreError::VerificationFailed { transaction, reason }) => {
            assert_eq!(*transaction, payload);
            assert_eq!(reason, VerificationError::InvalidSignature);
        }
        other => panic!("expected verification failure, got {:?}", other),
    }
    assert!(sandbox.finished().is_empty());
}

#[tokio::test]
async fn test_finalize_verified_finishes_and_returns_transaction() {
    let (sandbox, service) = setup(&[MONTHLY]);
    let payload = transaction(8, MONTHLY, None, None);

    let finalized = service.finalize(verified(payload.clone())).await.unwrap();

    assert_eq!(finalized, payload);
    assert_eq!(sandbox.finished(), vec![8]);
}
