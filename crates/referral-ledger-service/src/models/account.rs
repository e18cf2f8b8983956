//! 账户实体定义
//!
//! 账户同时承载余额和推荐关系，推荐关系在创建时确定且不可修改

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::RewardState;
use crate::error::{LedgerError, Result};

/// 账户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    /// 邮箱（小写存储，唯一）
    pub email: String,
    /// 本账户的推荐码（唯一）
    pub referral_code: String,
    /// 积分余额，只增不减
    pub balance: i64,
    /// 推荐人账户 ID，创建时确定
    #[sqlx(default)]
    pub referred_by: Option<String>,
    /// 是否已获得首单奖励
    pub rewarded_once: bool,
    /// 领取首单奖励的购买事件
    #[sqlx(default)]
    pub rewarded_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn reward_state(&self) -> RewardState {
        RewardState::from_flag(self.rewarded_once)
    }
}

/// 新建账户参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub id: String,
    pub email: String,
    pub referral_code: String,
    pub referred_by: Option<String>,
}

impl NewAccount {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        referral_code: impl Into<String>,
        referred_by: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            referral_code: referral_code.into(),
            referred_by,
        }
    }

    /// 校验新账户参数
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(LedgerError::Validation("账户 ID 不能为空".to_string()));
        }
        if self.referral_code.trim().is_empty() {
            return Err(LedgerError::Validation("推荐码不能为空".to_string()));
        }
        if self.referred_by.as_deref() == Some(self.id.as_str()) {
            return Err(LedgerError::SelfReferral(self.id.clone()));
        }
        Ok(())
    }

    /// 生成初始状态的账户（余额为 0，未奖励）
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        Account {
            id: self.id,
            email: self.email,
            referral_code: self.referral_code,
            balance: 0,
            referred_by: self.referred_by,
            rewarded_once: false,
            rewarded_event_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 推荐人维度的汇总数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    /// 填写了该推荐人的账户数
    pub total_referred: i64,
    /// 其中已完成首单的账户数
    pub converted: i64,
    /// 推荐人因推荐实际入账的积分
    pub credits_earned: i64,
}
