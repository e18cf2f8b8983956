//! 日志初始化模块
//!
//! 基于 tracing-subscriber 构建日志层，支持 JSON（结构化）和 pretty 两种输出格式。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// 构建环境过滤器
///
/// RUST_LOG 优先，其次为配置中的日志级别，都无效时回退到 info
fn build_env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化全局 tracing subscriber
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = build_env_filter(&config.log_level);

    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_env_filter_falls_back_on_invalid_level() {
        // 非法的过滤表达式不应 panic
        let _ = build_env_filter("not[a=valid");
    }
}
