//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时（如单元测试）所有记录函数均为空操作。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 与 `/health` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册业务指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("purchases_processed_total", "Total number of processed purchase events");
    metrics::describe_histogram!(
        "purchase_processing_duration_seconds",
        "Purchase processing duration in seconds"
    );
    metrics::describe_counter!("first_purchase_rewards_total", "Total number of first-purchase rewards granted");
    metrics::describe_counter!("referrer_credits_total", "Total number of referrer credit attempts by outcome");
    metrics::describe_counter!("accounts_registered_total", "Total number of registered accounts");
    metrics::describe_gauge!("worker_last_run_timestamp_seconds", "Unix timestamp of the last worker round");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次购买事件处理
///
/// status 取值：rewarded、not_rewarded 或错误码
#[inline]
pub fn record_purchase(status: &str, duration_secs: f64) {
    metrics::counter!("purchases_processed_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("purchase_processing_duration_seconds", "status" => status.to_string())
        .record(duration_secs);
}

/// 记录一次首单奖励发放
#[inline]
pub fn record_first_purchase_reward(amount: i64) {
    metrics::counter!("first_purchase_rewards_total").increment(1);
    metrics::counter!("first_purchase_reward_credits_total").increment(amount.max(0) as u64);
}

/// 记录推荐人奖励结果
#[inline]
pub fn record_referrer_credit(status: &str) {
    metrics::counter!("referrer_credits_total", "status" => status.to_string()).increment(1);
}

/// 记录账户注册
#[inline]
pub fn record_account_registered(referred: bool) {
    metrics::counter!("accounts_registered_total", "referred" => referred.to_string()).increment(1);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    metrics::gauge!("worker_last_run_timestamp_seconds", "worker" => worker.to_string()).set(now);
}
