//! 推荐奖励枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 账户的首单奖励状态
///
/// `Unrewarded` -> `Rewarded` 单向迁移，`Rewarded` 为终态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardState {
    /// 尚未完成首单奖励
    #[default]
    Unrewarded,
    /// 已获得首单奖励
    Rewarded,
}

impl RewardState {
    pub fn from_flag(rewarded_once: bool) -> Self {
        if rewarded_once {
            Self::Rewarded
        } else {
            Self::Unrewarded
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rewarded)
    }
}

/// 推荐人奖励结算状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferrerCreditStatus {
    /// 推荐人已入账
    Credited,
    /// 推荐人账户无法解析，结算为不入账
    ReferrerMissing,
}

impl ReferrerCreditStatus {
    /// 指标与日志使用的标签
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Credited => "credited",
            Self::ReferrerMissing => "referrer_missing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_state_from_flag() {
        assert_eq!(RewardState::from_flag(false), RewardState::Unrewarded);
        assert_eq!(RewardState::from_flag(true), RewardState::Rewarded);
        assert!(RewardState::Rewarded.is_terminal());
        assert!(!RewardState::default().is_terminal());
    }

    #[test]
    fn test_referrer_credit_status_serde() {
        let json = serde_json::to_string(&ReferrerCreditStatus::ReferrerMissing).unwrap();
        assert_eq!(json, "\"REFERRER_MISSING\"");
    }
}
