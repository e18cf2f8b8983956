//! 推荐奖励账本服务
//!
//! 被推荐人（referee）完成首次购买时，为其本人和推荐人（referrer）各发放一次固定奖励。
//!
//! ## 核心功能
//!
//! - **首单奖励**：每个账户仅奖励一次，并发购买请求中只有一个能获得奖励
//! - **幂等处理**：同一购买事件重复提交返回相同结果，余额只变动一次
//! - **推荐人奖励**：以被推荐人为幂等键，推荐人对每个被推荐人最多获得一次奖励
//! - **补偿任务**：推荐人奖励失败后由后台 Worker 重试
//! - **账户注册**：解析推荐码并为新账户生成唯一推荐码
//! - **推荐统计**：推荐人数、转化人数、累计推荐奖励
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `repository`: 账户存储（PostgreSQL / 内存）
//! - `service`: 业务服务层
//! - `worker`: 后台补偿任务

pub mod error;
pub mod models;
pub mod repository;
pub mod service;
pub mod worker;

pub use error::{LedgerError, Result};
pub use models::*;
pub use repository::{AccountStore, MemoryAccountStore, PgAccountStore};
pub use service::{RegistrationService, ReferralStatsService, RewardEngine, dto};
pub use worker::ReferrerCreditWorker;
