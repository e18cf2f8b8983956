//! 启动阶段的退避重试
//!
//! 服务启动时数据库可能尚未就绪，连接按指数退避重试若干次。
//! 业务路径不在内部重试，由调用方使用相同 event_id 重新发起。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// 指数退避参数
///
/// 第 n 次失败后等待 `base * 2^n`，不超过 `cap`
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// 总尝试次数（含首次）
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn delay(&self, failures: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(failures))
            .min(self.cap)
    }
}

/// 执行操作，仅对 `is_transient` 判定的错误退避重试
pub async fn with_backoff<F, Fut, T, E>(
    backoff: Backoff,
    what: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut failures = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        failures += 1;
        if failures >= backoff.attempts.max(1) || !is_transient(&err) {
            return Err(err);
        }

        let delay = backoff.delay(failures - 1);
        warn!(what, failures, delay_ms = delay.as_millis() as u64, error = %err, "启动依赖暂不可用，稍后重试");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SharedError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> Backoff {
        Backoff {
            attempts,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let backoff = Backoff {
            attempts: 10,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(3),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(3));
        assert_eq!(backoff.delay(40), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_pool_timeout_is_retried_until_connected() {
        let calls = AtomicU32::new(0);

        let result = with_backoff(quick(5), "database_connect", SharedError::is_retryable, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SharedError::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok("connected")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_configured_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> =
            with_backoff(quick(3), "database_connect", SharedError::is_retryable, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SharedError::Database(sqlx::Error::PoolTimedOut)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_config_error_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> =
            with_backoff(quick(5), "database_connect", SharedError::is_retryable, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SharedError::Internal("url 缺失".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
