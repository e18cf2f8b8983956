//! PostgreSQL 连接池
//!
//! 启动时按配置的退避参数重试建立连接池，随后执行迁移并确认连接可用。

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};
use crate::retry::{Backoff, with_backoff};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池，瞬时故障按 `connect_attempts` 与 `connect_backoff_ms` 重试
    #[instrument(skip_all, fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let backoff = Backoff {
            attempts: config.connect_attempts,
            base: Duration::from_millis(config.connect_backoff_ms),
            cap: Duration::from_secs(config.connect_timeout_seconds),
        };
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds));

        let pool = with_backoff(backoff, "database_connect", SharedError::is_retryable, || {
            let options = options.clone();
            async move { options.connect(&config.url).await.map_err(SharedError::from) }
        })
        .await?;

        info!("数据库连接池已建立");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行内嵌迁移并确认连接可用
    ///
    /// 迁移目录由拥有表结构的服务通过 `sqlx::migrate!` 嵌入后传入
    pub async fn prepare(&self, migrator: &Migrator) -> Result<()> {
        migrator.run(&self.pool).await?;
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        info!(migrations = migrator.iter().count(), "数据库迁移完成");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_connect_and_ping() {
        let db = Database::connect(&crate::test_utils::test_database_config())
            .await
            .unwrap();
        sqlx::query("SELECT 1").execute(db.pool()).await.unwrap();
        db.close().await;
    }
}
