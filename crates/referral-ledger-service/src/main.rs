//! 推荐奖励账本服务
//!
//! 启动数据库连接与迁移，运行推荐人奖励补偿 Worker，直到收到退出信号。

use std::sync::Arc;

use referral_ledger::{PgAccountStore, ReferrerCreditWorker, RewardEngine};
use referral_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "referral-ledger-service";

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 配置加载失败时使用默认值，待日志初始化后再提示
    let (config, load_error) = match AppConfig::load(SERVICE_NAME) {
        Ok(config) => (config, None),
        Err(e) => (
            AppConfig {
                service_name: SERVICE_NAME.to_string(),
                ..AppConfig::default()
            },
            Some(e),
        ),
    };

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    if let Some(e) = load_error {
        warn!(error = %e, "配置加载失败，使用默认配置");
    }

    info!(
        environment = %config.environment,
        reward_amount = config.reward.amount,
        "Starting {}",
        SERVICE_NAME
    );

    let db = Database::connect(&config.database).await?;
    db.prepare(&MIGRATOR).await?;

    let store = Arc::new(PgAccountStore::new(db.pool().clone()));
    let engine = Arc::new(RewardEngine::new(store, &config.reward)?);

    if config.worker.enabled {
        let worker = ReferrerCreditWorker::new(engine, &config.worker);
        tokio::select! {
            _ = worker.run() => {
                warn!("ReferrerCreditWorker 意外退出");
            }
            _ = shutdown_signal() => {}
        }
    } else {
        info!("ReferrerCreditWorker 已禁用");
        shutdown_signal().await;
    }

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
