//! 凭证生命周期测试
//!
//! 基于内存存储驱动签发与核销状态机

use std::sync::Arc;

use playpass::core::issuer::{NewVoucher, VoucherIssuer};
use playpass::core::redeemer::VoucherRedeemer;
use playpass::core::store::{MemoryStore, Store};
use playpass::domain::{OwnerType, Student, VoucherStatus};
use playpass::errors::PlatformError;

fn services() -> (Arc<MemoryStore>, VoucherIssuer, VoucherRedeemer) {
    let store = Arc::new(MemoryStore::new());
    let issuer = VoucherIssuer::new(store.clone(), false);
    let redeemer = VoucherRedeemer::new(store.clone());
    (store, issuer, redeemer)
}

fn individual_request(assigned_plays: i64) -> NewVoucher {
    NewVoucher {
        owner_id: "user-1".to_string(),
        owner_type: OwnerType::Individual,
        institution_id: None,
        assigned_plays,
        amount_paid: Some(120.0),
        expires_in_minutes: Some(60),
    }
}

#[tokio::test]
async fn test_issue_validation_rejections() {
    let (_, issuer, _) = services();

    // 次数为零：参照实现的放行行为按缺陷处理，这里必须拒绝
    let err = issuer.issue(individual_request(0)).await.unwrap_err();
    assert!(matches!(err, PlatformError::Validation(_)));

    let err = issuer.issue(individual_request(-3)).await.unwrap_err();
    assert!(matches!(err, PlatformError::Validation(_)));

    let err = issuer
        .issue(NewVoucher {
            owner_id: "   ".to_string(),
            ..individual_request(2)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Validation(_)));

    let err = issuer
        .issue(NewVoucher {
            owner_type: OwnerType::Student,
            institution_id: None,
            ..individual_request(2)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Validation(_)));

    let err = issuer
        .issue(NewVoucher {
            amount_paid: Some(-1.0),
            ..individual_request(2)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Validation(_)));

    let err = issuer
        .issue(NewVoucher {
            expires_in_minutes: Some(-5),
            ..individual_request(2)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Validation(_)));
}

#[tokio::test]
async fn test_redeem_sequence_until_exhausted() {
    let (_, issuer, redeemer) = services();
    let voucher = issuer.issue(individual_request(2)).await.unwrap();

    let first = redeemer.redeem(&voucher.token, None).await.unwrap();
    assert_eq!(first.remaining_plays, 1);
    assert!(!first.replayed);

    let second = redeemer.redeem(&voucher.token, None).await.unwrap();
    assert_eq!(second.remaining_plays, 0);

    let err = redeemer.redeem(&voucher.token, None).await.unwrap_err();
    assert!(matches!(err, PlatformError::Exhausted));
}

#[tokio::test]
async fn test_used_plays_never_exceeds_assigned() {
    let (store, issuer, redeemer) = services();
    let voucher = issuer.issue(individual_request(3)).await.unwrap();

    let mut successes = 0;
    let mut exhausted = 0;
    for _ in 0..5 {
        match redeemer.redeem(&voucher.token, None).await {
            Ok(_) => successes += 1,
            Err(PlatformError::Exhausted) => exhausted += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(successes, 3);
    assert_eq!(exhausted, 2);

    let loaded = store.get_voucher(&voucher.token).await.unwrap().unwrap();
    assert_eq!(loaded.used_plays, loaded.assigned_plays);
}

#[tokio::test]
async fn test_expired_voucher_rejected_unchanged() {
    let (store, issuer, redeemer) = services();
    // TTL 为 0，签发即过期
    let voucher = issuer
        .issue(NewVoucher {
            expires_in_minutes: Some(0),
            ..individual_request(3)
        })
        .await
        .unwrap();

    let err = redeemer.redeem(&voucher.token, None).await.unwrap_err();
    assert!(matches!(err, PlatformError::Expired));

    let loaded = store.get_voucher(&voucher.token).await.unwrap().unwrap();
    assert_eq!(loaded.used_plays, 0);
}

#[tokio::test]
async fn test_no_ttl_does_not_expire() {
    let (_, issuer, redeemer) = services();
    let voucher = issuer
        .issue(NewVoucher {
            expires_in_minutes: None,
            ..individual_request(1)
        })
        .await
        .unwrap();

    let receipt = redeemer.redeem(&voucher.token, None).await.unwrap();
    assert_eq!(receipt.remaining_plays, 0);
}

#[tokio::test]
async fn test_unknown_token() {
    let (store, _, redeemer) = services();

    let err = redeemer.redeem("nonexistent", None).await.unwrap_err();
    assert!(matches!(err, PlatformError::NotFound));

    assert!(store.get_voucher("nonexistent").await.unwrap().is_none());

    let err = redeemer.revoke("nonexistent").await.unwrap_err();
    assert!(matches!(err, PlatformError::NotFound));
}

#[tokio::test]
async fn test_revoked_is_absorbing() {
    let (_, issuer, redeemer) = services();
    let voucher = issuer.issue(individual_request(3)).await.unwrap();

    let revoked = redeemer.revoke(&voucher.token).await.unwrap();
    assert_eq!(revoked.status, VoucherStatus::Revoked);

    let err = redeemer.redeem(&voucher.token, None).await.unwrap_err();
    assert!(matches!(err, PlatformError::Revoked));
}

#[tokio::test]
async fn test_repeated_reads_are_stable() {
    let (store, issuer, redeemer) = services();
    let voucher = issuer.issue(individual_request(4)).await.unwrap();
    redeemer.redeem(&voucher.token, None).await.unwrap();

    let first = store.get_voucher(&voucher.token).await.unwrap().unwrap();
    let second = store.get_voucher(&voucher.token).await.unwrap().unwrap();
    assert_eq!(first.used_plays, second.used_plays);
    assert_eq!(first.remaining_plays(), second.remaining_plays());
    assert_eq!(first.used_plays, 1);
}

#[tokio::test]
async fn test_request_id_makes_retry_safe() {
    let (store, issuer, redeemer) = services();
    let voucher = issuer.issue(individual_request(2)).await.unwrap();

    let first = redeemer
        .redeem(&voucher.token, Some("terminal-9-req-1"))
        .await
        .unwrap();
    assert_eq!(first.remaining_plays, 1);
    assert!(!first.replayed);

    // 终端超时后原样重发：结果一致，不再消耗
    let retry = redeemer
        .redeem(&voucher.token, Some("terminal-9-req-1"))
        .await
        .unwrap();
    assert_eq!(retry.remaining_plays, 1);
    assert!(retry.replayed);

    let loaded = store.get_voucher(&voucher.token).await.unwrap().unwrap();
    assert_eq!(loaded.used_plays, 1);
}

#[tokio::test]
async fn test_concurrent_redeem_single_play_memory_store() {
    let (store, issuer, _) = services();
    let voucher = issuer.issue(individual_request(1)).await.unwrap();
    let now = chrono::Utc::now().timestamp();

    let s1: Arc<MemoryStore> = store.clone();
    let s2: Arc<MemoryStore> = store.clone();
    let t1 = voucher.token.clone();
    let t2 = voucher.token.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move { s1.try_redeem(&t1, None, now).await.unwrap() }),
        tokio::spawn(async move { s2.try_redeem(&t2, None, now).await.unwrap() }),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    use playpass::core::store::RedeemOutcome;
    let wins = outcomes
        .iter()
        .filter(|o| matches!(o, RedeemOutcome::Redeemed { .. }))
        .count();
    assert_eq!(wins, 1);

    let loaded = store.get_voucher(&voucher.token).await.unwrap().unwrap();
    assert_eq!(loaded.used_plays, 1);
}

#[tokio::test]
async fn test_owner_directory_check() {
    let store = Arc::new(MemoryStore::new());
    let issuer = VoucherIssuer::new(store.clone(), true);

    let student = Student::new(
        "Meera".to_string(),
        "meera@sunrise.example".to_string(),
        "8".to_string(),
        "B".to_string(),
        "23".to_string(),
        "inst-1".to_string(),
    );
    store.insert_student(&student).await.unwrap();

    // 目录里存在的学生可以签发
    let voucher = issuer
        .issue(NewVoucher {
            owner_id: student.id.clone(),
            owner_type: OwnerType::Student,
            institution_id: Some("inst-1".to_string()),
            assigned_plays: 2,
            amount_paid: None,
            expires_in_minutes: None,
        })
        .await
        .unwrap();
    assert_eq!(voucher.institution_id.as_deref(), Some("inst-1"));

    // 未知归属方被拒绝
    let err = issuer
        .issue(NewVoucher {
            owner_id: "ghost".to_string(),
            owner_type: OwnerType::Student,
            institution_id: Some("inst-1".to_string()),
            assigned_plays: 2,
            amount_paid: None,
            expires_in_minutes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Validation(_)));
}
