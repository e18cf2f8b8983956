//! 内存账户存储
//!
//! 使用 DashMap 实现的高并发内存存储，适用于测试和开发环境。
//! 每个原子操作都在单个条目锁内完成读与写，语义与 `PgAccountStore` 保持一致。
//!
//! 锁顺序：需要同时持有多个条目时，总是先 `credits` 后 `accounts`；
//! 遍历 `accounts` 时先复制出结果再访问其他 map。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::traits::AccountStore;
use crate::error::{LedgerError, Result};
use crate::models::{
    Account, NewAccount, ProcessedEvent, ReferralSummary, ReferrerCredit, ReferrerCreditResult,
    ReferrerCreditStatus, RewardClaim, RewardOutcome,
};

/// 内存账户存储
#[derive(Debug, Default, Clone)]
pub struct MemoryAccountStore {
    accounts: Arc<DashMap<String, Account>>,
    /// referral_code -> account_id
    codes: Arc<DashMap<String, String>>,
    /// email -> account_id
    emails: Arc<DashMap<String, String>>,
    events: Arc<DashMap<String, ProcessedEvent>>,
    credits: Arc<DashMap<String, ReferrerCredit>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入账户（跳过唯一性校验，用于准备测试数据）
    ///
    /// 可以构造推荐人不存在等注册流程无法产生的数据
    pub fn insert_account(&self, account: Account) {
        self.codes
            .insert(account.referral_code.clone(), account.id.clone());
        self.emails.insert(account.email.clone(), account.id.clone());
        self.accounts.insert(account.id.clone(), account);
    }

    /// 账户总数
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// 已登记的购买事件数
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.accounts.get(id).map(|a| a.clone()))
    }

    async fn create_account(&self, account: &NewAccount) -> Result<Account> {
        account.validate()?;

        if self.accounts.contains_key(&account.id) {
            return Err(LedgerError::AlreadyExists {
                field: "id".to_string(),
                value: account.id.clone(),
            });
        }

        // 先占用邮箱，再占用推荐码；推荐码冲突时释放邮箱
        match self.emails.entry(account.email.clone()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::AlreadyExists {
                    field: "email".to_string(),
                    value: account.email.clone(),
                });
            }
            Entry::Vacant(v) => {
                v.insert(account.id.clone());
            }
        }

        match self.codes.entry(account.referral_code.clone()) {
            Entry::Occupied(_) => {
                self.emails.remove(&account.email);
                return Err(LedgerError::AlreadyExists {
                    field: "referral_code".to_string(),
                    value: account.referral_code.clone(),
                });
            }
            Entry::Vacant(v) => {
                v.insert(account.id.clone());
            }
        }

        let created = account.clone().into_account(Utc::now());
        self.accounts.insert(created.id.clone(), created.clone());

        Ok(created)
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>> {
        let id = match self.codes.get(code) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn try_set_rewarded_once(&self, id: &str) -> Result<bool> {
        let Some(mut account) = self.accounts.get_mut(id) else {
            return Ok(false);
        };

        if account.rewarded_once {
            return Ok(false);
        }

        account.rewarded_once = true;
        account.updated_at = Utc::now();
        Ok(true)
    }

    async fn increment_balance(&self, id: &str, amount: i64) -> Result<Option<i64>> {
        if amount < 0 {
            return Err(LedgerError::Validation(format!(
                "余额只能增加，amount={}",
                amount
            )));
        }

        Ok(self.accounts.get_mut(id).map(|mut account| {
            account.balance += amount;
            account.updated_at = Utc::now();
            account.balance
        }))
    }

    async fn claim_first_reward(
        &self,
        id: &str,
        event_id: &str,
        amount: i64,
    ) -> Result<RewardClaim> {
        if amount < 0 {
            return Err(LedgerError::Validation(format!(
                "余额只能增加，amount={}",
                amount
            )));
        }

        let Some(mut account) = self.accounts.get_mut(id) else {
            return Ok(RewardClaim::AccountNotFound);
        };

        if account.rewarded_once {
            return Ok(RewardClaim::AlreadyRewarded {
                rewarded_event_id: account.rewarded_event_id.clone(),
                balance: account.balance,
            });
        }

        account.rewarded_once = true;
        account.rewarded_event_id = Some(event_id.to_string());
        account.balance += amount;
        account.updated_at = Utc::now();
        Ok(RewardClaim::Won {
            new_balance: account.balance,
        })
    }

    async fn record_event_if_new(&self, event_id: &str, account_id: &str) -> Result<bool> {
        match self.events.entry(event_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(ProcessedEvent::pending(event_id, account_id));
                Ok(true)
            }
        }
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>> {
        Ok(self.events.get(event_id).map(|e| e.clone()))
    }

    async fn complete_event(&self, event_id: &str, outcome: &RewardOutcome) -> Result<()> {
        if let Some(mut event) = self.events.get_mut(event_id) {
            // 同一事件的并发请求中，获奖结果覆盖未获奖结果
            let replace = match &event.outcome {
                None => true,
                Some(existing) => !existing.rewarded && outcome.rewarded,
            };
            if replace {
                event.outcome = Some(outcome.clone());
            }
        }
        Ok(())
    }

    async fn credit_referrer_once(
        &self,
        referee_id: &str,
        referrer_id: &str,
        amount: i64,
    ) -> Result<ReferrerCreditResult> {
        match self.credits.entry(referee_id.to_string()) {
            Entry::Occupied(existing) => Ok(ReferrerCreditResult::AlreadySettled {
                referrer_id: existing.get().referrer_id.clone(),
                status: existing.get().status,
            }),
            Entry::Vacant(v) => {
                // 持有结算条目锁期间入账，保证同一被推荐人只入账一次
                let new_balance = self.accounts.get_mut(referrer_id).map(|mut referrer| {
                    referrer.balance += amount;
                    referrer.updated_at = Utc::now();
                    referrer.balance
                });

                let (status, credited_amount, result) = match new_balance {
                    Some(new_balance) => (
                        ReferrerCreditStatus::Credited,
                        amount,
                        ReferrerCreditResult::Credited {
                            referrer_id: referrer_id.to_string(),
                            new_balance,
                        },
                    ),
                    None => (
                        ReferrerCreditStatus::ReferrerMissing,
                        0,
                        ReferrerCreditResult::ReferrerMissing {
                            referrer_id: referrer_id.to_string(),
                        },
                    ),
                };

                v.insert(ReferrerCredit {
                    referee_id: referee_id.to_string(),
                    referrer_id: referrer_id.to_string(),
                    amount: credited_amount,
                    status,
                    created_at: Utc::now(),
                });

                Ok(result)
            }
        }
    }

    async fn get_referrer_credit(&self, referee_id: &str) -> Result<Option<ReferrerCredit>> {
        Ok(self.credits.get(referee_id).map(|c| c.clone()))
    }

    async fn list_unsettled_referees(&self, limit: i64) -> Result<Vec<Account>> {
        let candidates: Vec<Account> = self
            .accounts
            .iter()
            .filter(|entry| entry.rewarded_once && entry.referred_by.is_some())
            .map(|entry| entry.value().clone())
            .collect();

        let mut unsettled: Vec<Account> = candidates
            .into_iter()
            .filter(|account| !self.credits.contains_key(&account.id))
            .collect();

        unsettled.sort_by_key(|account| account.updated_at);
        unsettled.truncate(limit.max(0) as usize);

        Ok(unsettled)
    }

    async fn referral_summary(&self, referrer_id: &str) -> Result<ReferralSummary> {
        let referred: Vec<bool> = self
            .accounts
            .iter()
            .filter(|entry| entry.referred_by.as_deref() == Some(referrer_id))
            .map(|entry| entry.rewarded_once)
            .collect();

        let credits_earned: i64 = self
            .credits
            .iter()
            .filter(|entry| {
                entry.referrer_id == referrer_id && entry.status == ReferrerCreditStatus::Credited
            })
            .map(|entry| entry.amount)
            .sum();

        Ok(ReferralSummary {
            total_referred: referred.len() as i64,
            converted: referred.iter().filter(|rewarded| **rewarded).count() as i64,
            credits_earned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(id: &str, code: &str, referred_by: Option<&str>) -> NewAccount {
        NewAccount::new(
            id,
            format!("{}@example.com", id),
            code,
            referred_by.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_create_and_find_account() {
        let store = MemoryAccountStore::new();
        let created = store
            .create_account(&new_account("a-1", "CODE0001", None))
            .await
            .unwrap();

        assert_eq!(created.balance, 0);
        assert_eq!(store.get_account("a-1").await.unwrap(), Some(created.clone()));
        assert_eq!(
            store.find_by_referral_code("CODE0001").await.unwrap(),
            Some(created)
        );
        assert!(store.find_by_referral_code("MISSING").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_account_rejects_duplicate_code_and_releases_email() {
        let store = MemoryAccountStore::new();
        store
            .create_account(&new_account("a-1", "CODE0001", None))
            .await
            .unwrap();

        let err = store
            .create_account(&new_account("a-2", "CODE0001", None))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists { ref field, .. } if field == "referral_code"));

        // 推荐码冲突后邮箱应被释放，换一个推荐码即可成功
        store
            .create_account(&new_account("a-2", "CODE0002", None))
            .await
            .unwrap();
        assert_eq!(store.account_count(), 2);
    }

    #[tokio::test]
    async fn test_try_set_rewarded_once_only_once() {
        let store = MemoryAccountStore::new();
        store
            .create_account(&new_account("a-1", "CODE0001", None))
            .await
            .unwrap();

        assert!(store.try_set_rewarded_once("a-1").await.unwrap());
        assert!(!store.try_set_rewarded_once("a-1").await.unwrap());
        assert!(!store.try_set_rewarded_once("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_balance() {
        let store = MemoryAccountStore::new();
        store
            .create_account(&new_account("a-1", "CODE0001", None))
            .await
            .unwrap();

        assert_eq!(store.increment_balance("a-1", 2).await.unwrap(), Some(2));
        assert_eq!(store.increment_balance("a-1", 3).await.unwrap(), Some(5));
        assert_eq!(store.increment_balance("missing", 2).await.unwrap(), None);
        assert!(store.increment_balance("a-1", -1).await.is_err());
    }

    #[tokio::test]
    async fn test_claim_first_reward_once() {
        let store = MemoryAccountStore::new();
        store
            .create_account(&new_account("a-1", "CODE0001", None))
            .await
            .unwrap();

        assert_eq!(
            store.claim_first_reward("a-1", "ev-1", 2).await.unwrap(),
            RewardClaim::Won { new_balance: 2 }
        );
        assert_eq!(
            store.claim_first_reward("a-1", "ev-2", 2).await.unwrap(),
            RewardClaim::AlreadyRewarded {
                rewarded_event_id: Some("ev-1".to_string()),
                balance: 2,
            }
        );
        assert_eq!(
            store.claim_first_reward("missing", "ev-1", 2).await.unwrap(),
            RewardClaim::AccountNotFound
        );

        let account = store.get_account("a-1").await.unwrap().unwrap();
        assert!(account.rewarded_once);
        assert_eq!(account.rewarded_event_id.as_deref(), Some("ev-1"));
    }

    #[tokio::test]
    async fn test_record_event_if_new() {
        let store = MemoryAccountStore::new();
        assert!(store.record_event_if_new("ev-1", "a-1").await.unwrap());
        assert!(!store.record_event_if_new("ev-1", "a-1").await.unwrap());

        let event = store.get_event("ev-1").await.unwrap().unwrap();
        assert!(!event.is_completed());

        let outcome = RewardOutcome::rewarded(2, None);
        store.complete_event("ev-1", &outcome).await.unwrap();
        // 第二次回填不覆盖
        store
            .complete_event("ev-1", &RewardOutcome::not_rewarded(9))
            .await
            .unwrap();
        assert_eq!(store.get_event("ev-1").await.unwrap().unwrap().outcome, Some(outcome));
    }

    #[tokio::test]
    async fn test_rewarded_outcome_supersedes_not_rewarded() {
        let store = MemoryAccountStore::new();
        store.record_event_if_new("ev-1", "a-1").await.unwrap();

        store
            .complete_event("ev-1", &RewardOutcome::not_rewarded(0))
            .await
            .unwrap();
        let outcome = RewardOutcome::rewarded(2, None);
        store.complete_event("ev-1", &outcome).await.unwrap();

        assert_eq!(store.get_event("ev-1").await.unwrap().unwrap().outcome, Some(outcome));
    }

    #[tokio::test]
    async fn test_credit_referrer_once() {
        let store = MemoryAccountStore::new();
        store
            .create_account(&new_account("r-1", "CODE0001", None))
            .await
            .unwrap();

        let first = store.credit_referrer_once("a-1", "r-1", 2).await.unwrap();
        assert_eq!(
            first,
            ReferrerCreditResult::Credited {
                referrer_id: "r-1".to_string(),
                new_balance: 2
            }
        );

        let second = store.credit_referrer_once("a-1", "r-1", 2).await.unwrap();
        assert_eq!(
            second,
            ReferrerCreditResult::AlreadySettled {
                referrer_id: "r-1".to_string(),
                status: ReferrerCreditStatus::Credited
            }
        );
        assert_eq!(store.get_account("r-1").await.unwrap().unwrap().balance, 2);
    }

    #[tokio::test]
    async fn test_credit_referrer_missing_is_settled() {
        let store = MemoryAccountStore::new();

        let result = store.credit_referrer_once("a-1", "ghost", 2).await.unwrap();
        assert!(matches!(result, ReferrerCreditResult::ReferrerMissing { .. }));

        let credit = store.get_referrer_credit("a-1").await.unwrap().unwrap();
        assert_eq!(credit.status, ReferrerCreditStatus::ReferrerMissing);
        assert_eq!(credit.amount, 0);
    }
}
