//! 账户存储层
//!
//! 账本核心只依赖 `AccountStore` 定义的原子操作，所有互斥都下沉到存储层完成。
//!
//! ## 设计原则
//!
//! - 存储只负责原子读写，不包含奖励决策逻辑
//! - `PgAccountStore` 使用条件更新与 `ON CONFLICT` 保证单账户字段的线性一致
//! - `MemoryAccountStore` 基于 DashMap 的条目锁提供相同语义，用于测试和本地开发
//! - 定义 trait 接口以支持 mock 测试

mod account_repo;
mod memory_store;
mod traits;

pub use account_repo::PgAccountStore;
pub use memory_store::MemoryAccountStore;
pub use traits::*;
