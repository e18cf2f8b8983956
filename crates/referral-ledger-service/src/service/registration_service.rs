//! 账户注册服务
//!
//! 负责规范化注册信息、解析推荐码并为新账户生成唯一推荐码。
//! 推荐码的唯一性由存储层唯一约束保证，冲突时重新生成。

use std::sync::Arc;

use rand::Rng;
use referral_shared::config::ReferralConfig;
use referral_shared::observability::metrics;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::RegisterAccountRequest;
use crate::error::{LedgerError, Result};
use crate::models::{Account, NewAccount};
use crate::repository::AccountStore;

/// 生成指定长度的大写字母数字推荐码
pub fn generate_referral_code(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();

    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(LedgerError::Validation(format!("邮箱格式不正确: {}", email)));
    }

    Ok(email)
}

/// 账户注册服务
pub struct RegistrationService<S>
where
    S: AccountStore,
{
    store: Arc<S>,
    config: ReferralConfig,
}

impl<S> RegistrationService<S>
where
    S: AccountStore,
{
    pub fn new(store: Arc<S>, config: ReferralConfig) -> Self {
        Self { store, config }
    }

    /// 注册新账户
    ///
    /// 推荐码无法解析时仍然创建账户，只是不挂载推荐人
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterAccountRequest) -> Result<Account> {
        let email = normalize_email(&request.email)?;
        let referred_by = match request.referral_code.as_deref() {
            Some(code) => self.resolve_referrer(code).await?,
            None => None,
        };

        let id = Uuid::new_v4().to_string();
        let max_attempts = self.config.max_code_attempts.max(1);

        for attempt in 1..=max_attempts {
            let code = generate_referral_code(self.config.code_length);
            let new_account = NewAccount::new(&id, &email, code, referred_by.clone());

            match self.store.create_account(&new_account).await {
                Ok(account) => {
                    metrics::record_account_registered(account.referred_by.is_some());
                    info!(
                        account_id = %account.id,
                        referral_code = %account.referral_code,
                        referred_by = ?account.referred_by,
                        "账户注册成功"
                    );
                    return Ok(account);
                }
                Err(LedgerError::AlreadyExists { field, .. }) if field == "referral_code" => {
                    warn!(attempt = attempt, "推荐码冲突，重新生成");
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::ReferralCodeExhausted {
            attempts: max_attempts,
        })
    }

    async fn resolve_referrer(&self, code: &str) -> Result<Option<String>> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Ok(None);
        }

        match self.store.find_by_referral_code(&code).await? {
            Some(referrer) => Ok(Some(referrer.id)),
            None => {
                warn!(referral_code = %code, "推荐码不存在，按无推荐人注册");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockAccountStore;
    use chrono::Utc;

    fn config() -> ReferralConfig {
        ReferralConfig {
            base_url: "https://yourapp.com/register".to_string(),
            code_length: 8,
            max_code_attempts: 3,
        }
    }

    #[test]
    fn test_generate_referral_code() {
        let code = generate_referral_code(8);
        assert_eq!(code.len(), 8);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Lina@Example.COM ").unwrap(),
            "lina@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@b@c").is_err());
    }

    #[tokio::test]
    async fn test_retries_on_code_collision() {
        let mut store = MockAccountStore::new();
        let mut calls = 0;
        store.expect_create_account().times(2).returning(move |new| {
            calls += 1;
            if calls == 1 {
                Err(LedgerError::AlreadyExists {
                    field: "referral_code".to_string(),
                    value: new.referral_code.clone(),
                })
            } else {
                Ok(new.clone().into_account(Utc::now()))
            }
        });

        let service = RegistrationService::new(Arc::new(store), config());
        let account = service
            .register(RegisterAccountRequest::new("lina@example.com"))
            .await
            .unwrap();
        assert_eq!(account.email, "lina@example.com");
    }

    #[tokio::test]
    async fn test_code_attempts_exhausted() {
        let mut store = MockAccountStore::new();
        store.expect_create_account().times(3).returning(|new| {
            Err(LedgerError::AlreadyExists {
                field: "referral_code".to_string(),
                value: new.referral_code.clone(),
            })
        });

        let service = RegistrationService::new(Arc::new(store), config());
        let err = service
            .register(RegisterAccountRequest::new("lina@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ReferralCodeExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_duplicate_email_not_retried() {
        let mut store = MockAccountStore::new();
        store.expect_create_account().times(1).returning(|new| {
            Err(LedgerError::AlreadyExists {
                field: "email".to_string(),
                value: new.email.clone(),
            })
        });

        let service = RegistrationService::new(Arc::new(store), config());
        let err = service
            .register(RegisterAccountRequest::new("lina@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists { field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn test_referral_code_is_normalized() {
        let mut store = MockAccountStore::new();
        store
            .expect_find_by_referral_code()
            .withf(|code| code == "AB12CD34")
            .returning(|code| {
                Ok(Some(
                    NewAccount::new("r-1", "ref@example.com", code, None).into_account(Utc::now()),
                ))
            });
        store
            .expect_create_account()
            .returning(|new| Ok(new.clone().into_account(Utc::now())));

        let service = RegistrationService::new(Arc::new(store), config());
        let account = service
            .register(RegisterAccountRequest::new("lina@example.com").with_referral_code(" ab12cd34 "))
            .await
            .unwrap();
        assert_eq!(account.referred_by.as_deref(), Some("r-1"));
    }
}
