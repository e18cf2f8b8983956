//! 推荐人奖励补偿 Worker
//!
//! 首单奖励发放时推荐人入账失败不会回滚购买人奖励，
//! 由本 Worker 定期扫描已获奖但推荐人尚未结算的账户并补发。
//!
//! 推荐人结算以被推荐人 ID 为幂等键，多实例同时运行也不会重复入账。

use std::sync::Arc;
use std::time::Duration;

use referral_shared::config::WorkerConfig;
use referral_shared::observability::metrics;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::repository::AccountStore;
use crate::service::RewardEngine;

const WORKER_NAME: &str = "referrer_credit_worker";

/// 推荐人奖励补偿 Worker
pub struct ReferrerCreditWorker<S>
where
    S: AccountStore,
{
    engine: Arc<RewardEngine<S>>,
    /// 轮询间隔
    poll_interval: Duration,
    /// 每批处理的最大账户数
    batch_size: i64,
}

impl<S> ReferrerCreditWorker<S>
where
    S: AccountStore,
{
    pub fn new(engine: Arc<RewardEngine<S>>, config: &WorkerConfig) -> Self {
        Self {
            engine,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            batch_size: config.batch_size.max(1),
        }
    }

    /// 主循环：持续补偿推荐人奖励直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "ReferrerCreditWorker 已启动"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "扫描待结算推荐人出错");
            }

            metrics::set_worker_last_run(WORKER_NAME);

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 执行一轮补偿，返回本轮实际入账的推荐人数
    ///
    /// 单个账户失败只记录日志，留待下一轮重试
    pub async fn run_once(&self) -> Result<usize> {
        let referees = self.engine.unsettled_referees(self.batch_size).await?;
        if referees.is_empty() {
            return Ok(0);
        }

        info!(count = referees.len(), "发现待结算推荐人奖励");

        let mut credited = 0;
        for referee in &referees {
            match self.engine.credit_referrer(&referee.id).await {
                Ok(result) if result.credited_referrer().is_some() => credited += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(referee_id = %referee.id, error = %e, "补发推荐人奖励失败");
                }
            }
        }

        info!(total = referees.len(), credited, "推荐人奖励补偿完成");
        Ok(credited)
    }
}
