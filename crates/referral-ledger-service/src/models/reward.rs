//! 购买事件与奖励结果定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ReferrerCreditStatus;

/// 购买事件
///
/// 由调用方在完成鉴权和商品校验后构造，event_id 由调用方保证每次购买尝试唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    pub account_id: String,
    pub event_id: String,
}

impl PurchaseEvent {
    pub fn new(account_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            event_id: event_id.into(),
        }
    }
}

/// 奖励处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardOutcome {
    /// 本次调用是否触发了首单奖励
    pub rewarded: bool,
    /// 处理后的购买人余额
    pub new_balance: i64,
    /// 获得推荐奖励的推荐人
    pub referrer_credited: Option<String>,
}

impl RewardOutcome {
    pub fn rewarded(new_balance: i64, referrer_credited: Option<String>) -> Self {
        Self {
            rewarded: true,
            new_balance,
            referrer_credited,
        }
    }

    pub fn not_rewarded(balance: i64) -> Self {
        Self {
            rewarded: false,
            new_balance: balance,
            referrer_credited: None,
        }
    }
}

/// 首单奖励领取结果
///
/// 领取在存储层一次原子操作内完成：置位首单标记、记录获奖事件、为购买人入账
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardClaim {
    /// 本次领取成功
    Won { new_balance: i64 },
    /// 账户此前已领取，`rewarded_event_id` 为领取时的购买事件
    AlreadyRewarded {
        rewarded_event_id: Option<String>,
        balance: i64,
    },
    AccountNotFound,
}

impl RewardClaim {
    /// 账户是否由给定事件领取了首单奖励
    pub fn is_claimed_by(&self, event_id: &str) -> bool {
        matches!(
            self,
            Self::AlreadyRewarded {
                rewarded_event_id: Some(winner),
                ..
            } if winner == event_id
        )
    }
}

/// 幂等记录
///
/// outcome 为空表示事件已登记但处理未完成（上一次尝试中途失败）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub event_id: String,
    pub account_id: String,
    pub outcome: Option<RewardOutcome>,
    pub created_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn pending(event_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            account_id: account_id.into(),
            outcome: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome.is_some()
    }
}

/// 推荐人奖励记录，以被推荐人 ID 为主键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerCredit {
    pub referee_id: String,
    pub referrer_id: String,
    /// 实际入账金额，推荐人缺失时为 0
    pub amount: i64,
    pub status: ReferrerCreditStatus,
    pub created_at: DateTime<Utc>,
}

/// 推荐人奖励子操作的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferrerCreditResult {
    /// 本次调用完成入账
    Credited {
        referrer_id: String,
        new_balance: i64,
    },
    /// 此前已结算过，不再变动余额
    AlreadySettled {
        referrer_id: String,
        status: ReferrerCreditStatus,
    },
    /// 推荐人账户不存在，已结算为不入账
    ReferrerMissing { referrer_id: String },
    /// 账户没有推荐人或尚未获得首单奖励
    NotEligible,
}

impl ReferrerCreditResult {
    /// 推荐人是否（在本次或此前）实际入账
    pub fn credited_referrer(&self) -> Option<&str> {
        match self {
            Self::Credited { referrer_id, .. } => Some(referrer_id),
            Self::AlreadySettled {
                referrer_id,
                status: ReferrerCreditStatus::Credited,
            } => Some(referrer_id),
            _ => None,
        }
    }

    /// 指标与日志使用的标签
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Credited { .. } => "credited",
            Self::AlreadySettled { .. } => "already_settled",
            Self::ReferrerMissing { .. } => "referrer_missing",
            Self::NotEligible => "not_eligible",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let outcome = RewardOutcome::rewarded(2, Some("r-1".to_string()));
        assert!(outcome.rewarded);
        assert_eq!(outcome.new_balance, 2);

        let outcome = RewardOutcome::not_rewarded(5);
        assert!(!outcome.rewarded);
        assert_eq!(outcome.new_balance, 5);
        assert!(outcome.referrer_credited.is_none());
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let json = serde_json::to_value(RewardOutcome::rewarded(2, None)).unwrap();
        assert_eq!(json["newBalance"], 2);
        assert_eq!(json["referrerCredited"], serde_json::Value::Null);
    }

    #[test]
    fn test_credited_referrer() {
        let credited = ReferrerCreditResult::Credited {
            referrer_id: "r-1".to_string(),
            new_balance: 2,
        };
        assert_eq!(credited.credited_referrer(), Some("r-1"));

        let settled_missing = ReferrerCreditResult::AlreadySettled {
            referrer_id: "r-1".to_string(),
            status: ReferrerCreditStatus::ReferrerMissing,
        };
        assert_eq!(settled_missing.credited_referrer(), None);

        let missing = ReferrerCreditResult::ReferrerMissing {
            referrer_id: "ghost".to_string(),
        };
        assert_eq!(missing.credited_referrer(), None);
        assert_eq!(ReferrerCreditResult::NotEligible.as_label(), "not_eligible");
    }

    #[test]
    fn test_reward_claim_is_claimed_by() {
        let claim = RewardClaim::AlreadyRewarded {
            rewarded_event_id: Some("ev-1".to_string()),
            balance: 2,
        };
        assert!(claim.is_claimed_by("ev-1"));
        assert!(!claim.is_claimed_by("ev-2"));
        assert!(!RewardClaim::Won { new_balance: 2 }.is_claimed_by("ev-1"));
    }

    #[test]
    fn test_processed_event_pending() {
        let event = ProcessedEvent::pending("ev-1", "a-1");
        assert!(!event.is_completed());
    }
}
