//! 账户仓储（PostgreSQL）
//!
//! 所有互斥依赖数据库的单语句原子性：
//! - 首单标记使用 `UPDATE ... WHERE rewarded_once = FALSE`，并发时只有一个请求影响到行
//! - 幂等记录与推荐人结算使用 `INSERT ... ON CONFLICT DO NOTHING`
//! - 余额使用 `balance = balance + $n`，可交换，无需加锁

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::traits::AccountStore;
use crate::error::{LedgerError, Result};
use crate::models::{
    Account, NewAccount, ProcessedEvent, ReferralSummary, ReferrerCredit, ReferrerCreditResult,
    ReferrerCreditStatus, RewardClaim, RewardOutcome,
};

const ACCOUNT_COLUMNS: &str =
    "id, email, referral_code, balance, referred_by, rewarded_once, rewarded_event_id, created_at, updated_at";

/// 幂等记录行
#[derive(sqlx::FromRow)]
struct ProcessedEventRow {
    event_id: String,
    account_id: String,
    rewarded: Option<bool>,
    new_balance: Option<i64>,
    referrer_credited: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ProcessedEventRow> for ProcessedEvent {
    fn from(row: ProcessedEventRow) -> Self {
        // rewarded 与 new_balance 在 complete_event 中一起回填
        let outcome = match (row.rewarded, row.new_balance) {
            (Some(rewarded), Some(new_balance)) => Some(RewardOutcome {
                rewarded,
                new_balance,
                referrer_credited: row.referrer_credited,
            }),
            _ => None,
        };

        Self {
            event_id: row.event_id,
            account_id: row.account_id,
            outcome,
            created_at: row.created_at,
        }
    }
}

/// 账户仓储
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 将唯一约束冲突转换为业务错误，其余数据库错误视为存储不可用
    fn map_insert_error(err: sqlx::Error, account: &NewAccount) -> LedgerError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return match db_err.constraint() {
                    Some("uq_accounts_referral_code") => LedgerError::AlreadyExists {
                        field: "referral_code".to_string(),
                        value: account.referral_code.clone(),
                    },
                    Some("uq_accounts_email") => LedgerError::AlreadyExists {
                        field: "email".to_string(),
                        value: account.email.clone(),
                    },
                    _ => LedgerError::AlreadyExists {
                        field: "id".to_string(),
                        value: account.id.clone(),
                    },
                };
            }
            if db_err.is_check_violation()
                && db_err.constraint() == Some("ck_accounts_no_self_referral")
            {
                return LedgerError::SelfReferral(account.id.clone());
            }
        }
        LedgerError::from(err)
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn create_account(&self, account: &NewAccount) -> Result<Account> {
        account.validate()?;

        let created = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (id, email, referral_code, referred_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.referral_code)
        .bind(&account.referred_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_insert_error(e, account))?;

        Ok(created)
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE referral_code = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn try_set_rewarded_once(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET rewarded_once = TRUE, updated_at = NOW()
            WHERE id = $1 AND rewarded_once = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_balance(&self, id: &str, amount: i64) -> Result<Option<i64>> {
        if amount < 0 {
            return Err(LedgerError::Validation(format!(
                "余额只能增加，amount={}",
                amount
            )));
        }

        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    #[instrument(skip(self))]
    async fn claim_first_reward(
        &self,
        id: &str,
        event_id: &str,
        amount: i64,
    ) -> Result<RewardClaim> {
        if amount < 0 {
            return Err(LedgerError::Validation(format!(
                "余额只能增加，amount={}",
                amount
            )));
        }

        // 置位、记录获奖事件与入账在同一条语句内完成
        let won = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE accounts
            SET rewarded_once = TRUE,
                rewarded_event_id = $2,
                balance = balance + $3,
                updated_at = NOW()
            WHERE id = $1 AND rewarded_once = FALSE
            RETURNING balance
            "#,
        )
        .bind(id)
        .bind(event_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(new_balance) = won {
            return Ok(RewardClaim::Won { new_balance });
        }

        let existing = sqlx::query_as::<_, (Option<String>, i64)>(
            "SELECT rewarded_event_id, balance FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match existing {
            Some((rewarded_event_id, balance)) => RewardClaim::AlreadyRewarded {
                rewarded_event_id,
                balance,
            },
            None => RewardClaim::AccountNotFound,
        })
    }

    async fn record_event_if_new(&self, event_id: &str, account_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, account_id)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>> {
        let row = sqlx::query_as::<_, ProcessedEventRow>(
            r#"
            SELECT event_id, account_id, rewarded, new_balance, referrer_credited, created_at
            FROM processed_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProcessedEvent::from))
    }

    async fn complete_event(&self, event_id: &str, outcome: &RewardOutcome) -> Result<()> {
        // 同一事件的并发请求中，获奖结果覆盖未获奖结果，其余情况保留首次结果
        sqlx::query(
            r#"
            UPDATE processed_events
            SET rewarded = $2, new_balance = $3, referrer_credited = $4, completed_at = NOW()
            WHERE event_id = $1
              AND (completed_at IS NULL OR (rewarded = FALSE AND $2 = TRUE))
            "#,
        )
        .bind(event_id)
        .bind(outcome.rewarded)
        .bind(outcome.new_balance)
        .bind(&outcome.referrer_credited)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn credit_referrer_once(
        &self,
        referee_id: &str,
        referrer_id: &str,
        amount: i64,
    ) -> Result<ReferrerCreditResult> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO referrer_credits (referee_id, referrer_id, amount, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (referee_id) DO NOTHING
            "#,
        )
        .bind(referee_id)
        .bind(referrer_id)
        .bind(amount)
        .bind(ReferrerCreditStatus::Credited)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // 已结算：回滚空事务后读取既有结算状态
            tx.rollback().await?;
            let existing = self.get_referrer_credit(referee_id).await?.ok_or_else(|| {
                LedgerError::Internal(format!("推荐人结算记录丢失: referee_id={}", referee_id))
            })?;
            return Ok(ReferrerCreditResult::AlreadySettled {
                referrer_id: existing.referrer_id,
                status: existing.status,
            });
        }

        let new_balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(referrer_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match new_balance {
            Some(new_balance) => ReferrerCreditResult::Credited {
                referrer_id: referrer_id.to_string(),
                new_balance,
            },
            None => {
                sqlx::query(
                    r#"
                    UPDATE referrer_credits
                    SET status = $2, amount = 0
                    WHERE referee_id = $1
                    "#,
                )
                .bind(referee_id)
                .bind(ReferrerCreditStatus::ReferrerMissing)
                .execute(&mut *tx)
                .await?;

                ReferrerCreditResult::ReferrerMissing {
                    referrer_id: referrer_id.to_string(),
                }
            }
        };

        tx.commit().await?;

        Ok(result)
    }

    async fn get_referrer_credit(&self, referee_id: &str) -> Result<Option<ReferrerCredit>> {
        let credit = sqlx::query_as::<_, ReferrerCredit>(
            r#"
            SELECT referee_id, referrer_id, amount, status, created_at
            FROM referrer_credits
            WHERE referee_id = $1
            "#,
        )
        .bind(referee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credit)
    }

    async fn list_unsettled_referees(&self, limit: i64) -> Result<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT a.id, a.email, a.referral_code, a.balance, a.referred_by,
                   a.rewarded_once, a.rewarded_event_id, a.created_at, a.updated_at
            FROM accounts a
            LEFT JOIN referrer_credits c ON c.referee_id = a.id
            WHERE a.rewarded_once = TRUE
              AND a.referred_by IS NOT NULL
              AND c.referee_id IS NULL
            ORDER BY a.updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn referral_summary(&self, referrer_id: &str) -> Result<ReferralSummary> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_referred,
                   COUNT(*) FILTER (WHERE rewarded_once) AS converted
            FROM accounts
            WHERE referred_by = $1
            "#,
        )
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await?;

        let credits_earned = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM referrer_credits
            WHERE referrer_id = $1 AND status = $2
            "#,
        )
        .bind(referrer_id)
        .bind(ReferrerCreditStatus::Credited)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReferralSummary {
            total_referred: row.get("total_referred"),
            converted: row.get("converted"),
            credits_earned,
        })
    }
}
