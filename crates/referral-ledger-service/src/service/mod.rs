//! 服务层
//!
//! 实现推荐奖励业务逻辑，协调仓储层完成注册、首单奖励与统计。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `reward_engine`: 首单奖励引擎
//! - `registration_service`: 账户注册（推荐码解析与生成）
//! - `stats_service`: 推荐统计（只读操作）

pub mod dto;
pub mod registration_service;
pub mod reward_engine;
pub mod stats_service;

pub use dto::*;
pub use registration_service::RegistrationService;
pub use reward_engine::RewardEngine;
pub use stats_service::ReferralStatsService;
