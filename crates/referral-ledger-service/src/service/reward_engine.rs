//! 首单奖励引擎
//!
//! 处理购买事件并决定是否发放首单奖励，包括：
//! - 幂等检查（同一 event_id 只处理一次）
//! - 首单领取（账户级别只奖励一次，并发请求中只有一个胜出，领取与购买人入账原子完成）
//! - 推荐人入账（以被推荐人为幂等键的独立子操作，失败不影响购买人奖励）
//!
//! ## 处理流程
//!
//! 1. 账户存在性检查 -> 2. 登记事件 -> 3. 领取首单奖励并入账
//!    -> 4. 推荐人入账（失败仅记录日志，由补偿 Worker 重试）-> 5. 回填事件结果
//!
//! 账户记录领取奖励的 event_id，同一事件的并发请求或重试即使在领取上落败，
//! 也能识别出奖励属于本事件并返回一致的结果。
//!
//! 引擎本身不持有任何锁，也不在内部重试；互斥由存储层原子操作保证，
//! 重试由调用方使用相同 event_id 发起。

use std::sync::Arc;
use std::time::Instant;

use referral_shared::config::RewardConfig;
use referral_shared::observability::metrics;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::models::{Account, PurchaseEvent, ReferrerCreditResult, RewardClaim, RewardOutcome};
use crate::repository::AccountStore;

/// 首单奖励引擎
///
/// 存储句柄在构造时注入，引擎不依赖任何进程级全局状态。
pub struct RewardEngine<S>
where
    S: AccountStore,
{
    store: Arc<S>,
    reward_amount: i64,
}

impl<S> RewardEngine<S>
where
    S: AccountStore,
{
    pub fn new(store: Arc<S>, config: &RewardConfig) -> Result<Self> {
        if config.amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "奖励额度必须大于 0，当前值 {}",
                config.amount
            )));
        }

        Ok(Self {
            store,
            reward_amount: config.amount,
        })
    }

    /// 处理一次购买事件
    ///
    /// 同一 event_id 重放时返回首次处理记录的结果；
    /// 存储故障返回可重试的 `StoreUnavailable`，调用方可用相同 event_id 重试。
    #[instrument(skip_all, fields(account_id = %account_id, event_id = %event_id))]
    pub async fn process_purchase(&self, account_id: &str, event_id: &str) -> Result<RewardOutcome> {
        let started = Instant::now();
        let result = self.process_purchase_internal(account_id, event_id).await;

        let status = match &result {
            Ok(outcome) if outcome.rewarded => "rewarded",
            Ok(_) => "not_rewarded",
            Err(e) => e.error_code(),
        };
        metrics::record_purchase(status, started.elapsed().as_secs_f64());

        result
    }

    /// 处理调用方构造好的购买事件
    pub async fn process(&self, event: &PurchaseEvent) -> Result<RewardOutcome> {
        self.process_purchase(&event.account_id, &event.event_id).await
    }

    async fn process_purchase_internal(
        &self,
        account_id: &str,
        event_id: &str,
    ) -> Result<RewardOutcome> {
        if account_id.trim().is_empty() {
            return Err(LedgerError::Validation("account_id 不能为空".to_string()));
        }
        if event_id.trim().is_empty() {
            return Err(LedgerError::Validation("event_id 不能为空".to_string()));
        }

        // 1. 账户存在性检查，避免为不存在的账户登记事件
        let account = self.load_account(account_id).await?;

        // 2. 幂等检查
        if !self.store.record_event_if_new(event_id, account_id).await? {
            if let Some(outcome) = self.check_replay(account_id, event_id).await? {
                info!(rewarded = outcome.rewarded, "重放请求，返回已记录的结果");
                return Ok(outcome);
            }
            warn!("事件已登记但未完成处理，继续执行");
        }

        // 3. 领取首单奖励并为购买人入账（线性化点，单个原子操作）
        let claim = self
            .store
            .claim_first_reward(account_id, event_id, self.reward_amount)
            .await?;

        let new_balance = match claim {
            RewardClaim::Won { new_balance } => {
                metrics::record_first_purchase_reward(self.reward_amount);
                new_balance
            }
            // 本事件此前已领取：并发的同一事件请求，或上次领取后未完成回填
            RewardClaim::AlreadyRewarded { balance, .. } if claim.is_claimed_by(event_id) => {
                if let Some(outcome) = self.stored_outcome(event_id).await {
                    return Ok(outcome);
                }
                info!("本事件已领取首单奖励，补齐后续步骤");
                balance
            }
            RewardClaim::AlreadyRewarded { balance, .. } => {
                let outcome = RewardOutcome::not_rewarded(balance);
                info!(balance = balance, "账户已获得过首单奖励");
                self.complete_event(event_id, &outcome).await;
                return Ok(outcome);
            }
            RewardClaim::AccountNotFound => {
                return Err(LedgerError::AccountNotFound(account_id.to_string()));
            }
        };

        // 4. 推荐人入账，以被推荐人为幂等键，失败不影响购买人奖励
        let referrer_credited = match account.referred_by.as_deref() {
            Some(referrer_id) => self.settle_referrer(account_id, referrer_id).await,
            None => None,
        };

        let outcome = RewardOutcome::rewarded(new_balance, referrer_credited);
        info!(
            new_balance = new_balance,
            referrer_credited = ?outcome.referrer_credited,
            "首单奖励发放成功"
        );

        // 5. 回填事件结果
        self.complete_event(event_id, &outcome).await;

        Ok(outcome)
    }

    /// 为已获得首单奖励的账户补发推荐人奖励
    ///
    /// 以被推荐人 ID 为幂等键，可安全地重复调用；
    /// 与 `process_purchase` 不同，存储故障会返回给调用方。
    #[instrument(skip(self))]
    pub async fn credit_referrer(&self, referee_id: &str) -> Result<ReferrerCreditResult> {
        let account = self.load_account(referee_id).await?;

        let referrer_id = match account.referred_by.as_deref() {
            Some(referrer_id) if account.reward_state().is_terminal() => referrer_id,
            _ => return Ok(ReferrerCreditResult::NotEligible),
        };

        let result = self
            .store
            .credit_referrer_once(referee_id, referrer_id, self.reward_amount)
            .await?;
        self.log_referrer_credit(referee_id, &result);

        Ok(result)
    }

    /// 查询推荐人奖励尚未结算的账户
    pub async fn unsettled_referees(&self, limit: i64) -> Result<Vec<Account>> {
        self.store.list_unsettled_referees(limit).await
    }

    // ==================== 私有方法 ====================

    async fn load_account(&self, account_id: &str) -> Result<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// 重放检查
    ///
    /// 返回 Some 表示事件已完成处理；返回 None 表示上次处理中途失败，需要继续
    async fn check_replay(&self, account_id: &str, event_id: &str) -> Result<Option<RewardOutcome>> {
        let Some(event) = self.store.get_event(event_id).await? else {
            return Ok(None);
        };

        if event.account_id != account_id {
            return Err(LedgerError::EventConflict {
                event_id: event_id.to_string(),
                account_id: account_id.to_string(),
            });
        }

        Ok(event.outcome)
    }

    /// 推荐人入账
    ///
    /// 返回实际入账的推荐人 ID。推荐人缺失和存储故障都只记录日志。
    async fn settle_referrer(&self, referee_id: &str, referrer_id: &str) -> Option<String> {
        match self
            .store
            .credit_referrer_once(referee_id, referrer_id, self.reward_amount)
            .await
        {
            Ok(result) => {
                self.log_referrer_credit(referee_id, &result);
                result.credited_referrer().map(str::to_string)
            }
            Err(e) => {
                metrics::record_referrer_credit("failed");
                warn!(
                    referee_id = %referee_id,
                    referrer_id = %referrer_id,
                    error = %e,
                    "推荐人奖励失败，等待补偿任务重试"
                );
                None
            }
        }
    }

    fn log_referrer_credit(&self, referee_id: &str, result: &ReferrerCreditResult) {
        metrics::record_referrer_credit(result.as_label());

        match result {
            ReferrerCreditResult::Credited {
                referrer_id,
                new_balance,
            } => {
                info!(
                    referee_id = %referee_id,
                    referrer_id = %referrer_id,
                    new_balance = new_balance,
                    "推荐人奖励入账"
                );
            }
            ReferrerCreditResult::ReferrerMissing { referrer_id } => {
                let err = LedgerError::ReferrerResolutionFailed {
                    referee_id: referee_id.to_string(),
                    referrer_id: referrer_id.clone(),
                };
                warn!(error = %err, "推荐人不存在，跳过推荐奖励");
            }
            ReferrerCreditResult::AlreadySettled { referrer_id, status } => {
                info!(
                    referee_id = %referee_id,
                    referrer_id = %referrer_id,
                    status = status.as_label(),
                    "推荐人奖励此前已结算"
                );
            }
            ReferrerCreditResult::NotEligible => {}
        }
    }

    /// 读取事件已回填的结果，读取失败按未回填处理
    async fn stored_outcome(&self, event_id: &str) -> Option<RewardOutcome> {
        match self.store.get_event(event_id).await {
            Ok(event) => event.and_then(|e| e.outcome).filter(|o| o.rewarded),
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "读取事件结果失败");
                None
            }
        }
    }

    /// 回填事件结果
    ///
    /// 奖励已经生效，回填失败只记录日志；重试时会从首单标记处继续
    async fn complete_event(&self, event_id: &str, outcome: &RewardOutcome) {
        if let Err(e) = self.store.complete_event(event_id, outcome).await {
            warn!(event_id = %event_id, error = %e, "事件结果回填失败");
        }
    }
}
