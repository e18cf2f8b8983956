//! 注册与推荐统计集成测试（内存存储）

use std::sync::Arc;

use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use referral_ledger::{
    AccountStore, LedgerError, MemoryAccountStore, ReferralStatsService, RegistrationService,
    RewardEngine, dto::RegisterAccountRequest,
};
use referral_shared::config::{ReferralConfig, RewardConfig};
use referral_shared::test_utils::test_event_id;

fn services() -> (
    Arc<MemoryAccountStore>,
    RegistrationService<MemoryAccountStore>,
    ReferralStatsService<MemoryAccountStore>,
    RewardEngine<MemoryAccountStore>,
) {
    let store = Arc::new(MemoryAccountStore::new());
    let config = ReferralConfig {
        base_url: "https://shop.example.com/join".to_string(),
        ..ReferralConfig::default()
    };
    let registration = RegistrationService::new(store.clone(), config.clone());
    let stats = ReferralStatsService::new(store.clone(), &config);
    let engine = RewardEngine::new(store.clone(), &RewardConfig { amount: 2 }).unwrap();
    (store, registration, stats, engine)
}

#[tokio::test]
async fn test_register_without_referral_code() {
    let (store, registration, _, _) = services();
    let email: String = SafeEmail().fake();

    let account = registration
        .register(RegisterAccountRequest::new(email.to_uppercase()))
        .await
        .unwrap();

    assert_eq!(account.email, email.to_lowercase());
    assert_eq!(account.balance, 0);
    assert!(!account.rewarded_once);
    assert!(account.referred_by.is_none());
    assert_eq!(account.referral_code.len(), 8);
    assert_eq!(store.account_count(), 1);
}

#[tokio::test]
async fn test_register_with_referral_code() {
    let (_, registration, _, _) = services();
    let referrer = registration
        .register(RegisterAccountRequest::new("referrer@example.com"))
        .await
        .unwrap();

    let referee = registration
        .register(
            RegisterAccountRequest::new("referee@example.com")
                .with_referral_code(referrer.referral_code.to_lowercase()),
        )
        .await
        .unwrap();

    assert_eq!(referee.referred_by.as_deref(), Some(referrer.id.as_str()));
    assert_ne!(referee.referral_code, referrer.referral_code);
}

#[tokio::test]
async fn test_unknown_referral_code_registers_without_referrer() {
    let (_, registration, _, _) = services();

    let account = registration
        .register(RegisterAccountRequest::new("lina@example.com").with_referral_code("NOPE0000"))
        .await
        .unwrap();

    assert!(account.referred_by.is_none());
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let (store, registration, _, _) = services();
    registration
        .register(RegisterAccountRequest::new("lina@example.com"))
        .await
        .unwrap();

    let err = registration
        .register(RegisterAccountRequest::new(" Lina@Example.com "))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::AlreadyExists { field, .. } if field == "email"));
    assert_eq!(store.account_count(), 1);
}

#[tokio::test]
async fn test_invalid_email_rejected() {
    let (_, registration, _, _) = services();

    let err = registration
        .register(RegisterAccountRequest::new("not-an-email"))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn test_stats_after_referee_purchases() {
    let (store, registration, stats, engine) = services();
    let referrer = registration
        .register(RegisterAccountRequest::new("referrer@example.com"))
        .await
        .unwrap();

    let mut referees = Vec::new();
    for i in 0..3 {
        let referee = registration
            .register(
                RegisterAccountRequest::new(format!("friend{}@example.com", i))
                    .with_referral_code(&referrer.referral_code),
            )
            .await
            .unwrap();
        referees.push(referee.id);
    }

    // 两位被推荐人完成首单，其中一位多次购买
    engine.process_purchase(&referees[0], &test_event_id()).await.unwrap();
    engine.process_purchase(&referees[0], &test_event_id()).await.unwrap();
    engine.process_purchase(&referees[1], &test_event_id()).await.unwrap();

    let result = stats.stats(&referrer.id).await.unwrap();
    assert_eq!(
        result.referral_link,
        format!("https://shop.example.com/join?r={}", referrer.referral_code)
    );
    assert_eq!(result.total_referred_users, 3);
    assert_eq!(result.converted_users, 2);
    assert_eq!(result.total_credits_earned, 4);
    assert_eq!(result.current_credit_balance, 4);

    let referee = store.get_account(&referees[0]).await.unwrap().unwrap();
    assert_eq!(referee.balance, 2);
}
