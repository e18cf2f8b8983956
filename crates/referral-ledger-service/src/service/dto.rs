//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的 DTO，与内部领域模型解耦

use serde::{Deserialize, Serialize};

/// 注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAccountRequest {
    pub email: String,
    /// 推荐人的推荐码，大小写不敏感
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}

impl RegisterAccountRequest {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            referral_code: None,
        }
    }

    pub fn with_referral_code(mut self, code: impl Into<String>) -> Self {
        self.referral_code = Some(code.into());
        self
    }
}

/// 推荐统计 DTO
///
/// 账户推荐面板展示的数据，聚合了推荐链接、转化情况与余额
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub referral_code: String,
    pub referral_link: String,
    /// 通过该账户推荐码注册的用户数
    pub total_referred_users: i64,
    /// 其中已完成首单的用户数
    pub converted_users: i64,
    /// 推荐奖励累计入账
    pub total_credits_earned: i64,
    /// 账户当前余额（含首单奖励与推荐奖励）
    pub current_credit_balance: i64,
}
