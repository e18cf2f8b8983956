//! 推荐奖励服务错误类型
//!
//! 定义账本核心的业务错误和存储错误

use thiserror::Error;

/// 推荐奖励服务错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // === 账户相关错误 ===
    #[error("账户不存在: {0}")]
    AccountNotFound(String),

    #[error("账户不能推荐自己: {0}")]
    SelfReferral(String),

    #[error("记录已存在: {field}={value}")]
    AlreadyExists { field: String, value: String },

    #[error("推荐码生成失败，已重试 {attempts} 次仍冲突")]
    ReferralCodeExhausted { attempts: u32 },

    // === 奖励相关错误 ===
    /// 推荐人无法解析，仅记录日志，不影响被推荐人本人的奖励
    #[error("推荐人解析失败: referee_id={referee_id}, referrer_id={referrer_id}")]
    ReferrerResolutionFailed {
        referee_id: String,
        referrer_id: String,
    },

    #[error("购买事件已属于其他账户: event_id={event_id}, account_id={account_id}")]
    EventConflict { event_id: String, account_id: String },

    // === 系统错误 ===
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 推荐奖励服务 Result 类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl LedgerError {
    /// 检查是否为可重试的错误
    ///
    /// 存储故障可以用相同的 event_id 重试，幂等记录保证不会重复奖励
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// 获取错误码（用于 API 响应和指标标签）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::SelfReferral(_) => "SELF_REFERRAL",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::ReferralCodeExhausted { .. } => "REFERRAL_CODE_EXHAUSTED",
            Self::ReferrerResolutionFailed { .. } => "REFERRER_RESOLUTION_FAILED",
            Self::EventConflict { .. } => "EVENT_CONFLICT",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
