//! 共享库
//!
//! 包含推荐奖励服务共用的配置、错误处理、数据库连接、重试与可观测性等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod retry;
pub mod test_utils;
