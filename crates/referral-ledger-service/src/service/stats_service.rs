//! 推荐统计服务（只读）

use std::sync::Arc;

use referral_shared::config::ReferralConfig;
use tracing::instrument;

use super::dto::ReferralStats;
use crate::error::{LedgerError, Result};
use crate::repository::AccountStore;

pub struct ReferralStatsService<S>
where
    S: AccountStore,
{
    store: Arc<S>,
    base_url: String,
}

impl<S> ReferralStatsService<S>
where
    S: AccountStore,
{
    pub fn new(store: Arc<S>, config: &ReferralConfig) -> Self {
        Self {
            store,
            base_url: config.base_url.clone(),
        }
    }

    pub fn referral_link(&self, code: &str) -> String {
        format!("{}?r={}", self.base_url, code)
    }

    #[instrument(skip(self))]
    pub async fn stats(&self, account_id: &str) -> Result<ReferralStats> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let summary = self.store.referral_summary(account_id).await?;

        Ok(ReferralStats {
            referral_link: self.referral_link(&account.referral_code),
            referral_code: account.referral_code,
            total_referred_users: summary.total_referred,
            converted_users: summary.converted,
            total_credits_earned: summary.credits_earned,
            current_credit_balance: account.balance,
        })
    }
}
