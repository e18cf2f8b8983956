//! 存储 Trait 定义
//!
//! 定义账户存储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Account, NewAccount, ProcessedEvent, ReferralSummary, ReferrerCredit, ReferrerCreditResult,
    RewardClaim, RewardOutcome,
};

/// 账户存储接口
///
/// 每个操作对其涉及的字段都是原子的。存储故障统一返回 `LedgerError::StoreUnavailable`。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    // 账户
    async fn get_account(&self, id: &str) -> Result<Option<Account>>;
    async fn create_account(&self, account: &NewAccount) -> Result<Account>;
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>>;

    /// 首单奖励的线性化点：仅当 rewarded_once 为 false 时置为 true 并返回 true
    async fn try_set_rewarded_once(&self, id: &str) -> Result<bool>;

    /// 原子增加余额，返回新余额；账户不存在返回 None
    async fn increment_balance(&self, id: &str, amount: i64) -> Result<Option<i64>>;

    /// 在同一原子单元内执行 `try_set_rewarded_once` 与 `increment_balance`，并记录获奖事件
    ///
    /// 领取与入账不可分割，重试时可通过 `rewarded_event_id` 识别本事件是否已领取
    async fn claim_first_reward(
        &self,
        id: &str,
        event_id: &str,
        amount: i64,
    ) -> Result<RewardClaim>;

    // 幂等记录
    /// 首次登记 event_id 时返回 true
    async fn record_event_if_new(&self, event_id: &str, account_id: &str) -> Result<bool>;
    async fn get_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>>;
    /// 回填处理结果；已有结果时只允许获奖结果覆盖未获奖结果
    async fn complete_event(&self, event_id: &str, outcome: &RewardOutcome) -> Result<()>;

    // 推荐人奖励
    /// 以 referee_id 为幂等键，在同一原子单元内登记结算记录并为推荐人入账
    async fn credit_referrer_once(
        &self,
        referee_id: &str,
        referrer_id: &str,
        amount: i64,
    ) -> Result<ReferrerCreditResult>;
    async fn get_referrer_credit(&self, referee_id: &str) -> Result<Option<ReferrerCredit>>;

    /// 已获得首单奖励、有推荐人、但推荐人奖励尚未结算的账户
    async fn list_unsettled_referees(&self, limit: i64) -> Result<Vec<Account>>;

    // 统计
    async fn referral_summary(&self, referrer_id: &str) -> Result<ReferralSummary>;
}
