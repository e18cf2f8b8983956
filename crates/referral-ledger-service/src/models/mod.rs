//! 推荐奖励领域模型
//!
//! 包含账户、购买事件、奖励结果等核心实体定义

pub mod account;
pub mod enums;
pub mod reward;

pub use account::{Account, NewAccount, ReferralSummary};
pub use enums::{ReferrerCreditStatus, RewardState};
pub use reward::{
    ProcessedEvent, PurchaseEvent, ReferrerCredit, ReferrerCreditResult, RewardClaim, RewardOutcome,
};
