//! Repository for the credit ledger tables.
//!
//! The ledger is mutated only through [`CreditRepo::engage`]: a single
//! conditional decrement inside a transaction, keyed by job id. There is
//! no read-then-write of the balance anywhere, so concurrent launches
//! cannot lose updates, and the `credit_engagements` primary key makes a
//! retried engage for the same job a no-op on the balance.

use sqlx::PgPool;

use quantdesk_core::feature::Feature;
use quantdesk_core::types::DbId;

use crate::models::credit::{CreditAccount, CreditBalance, LaunchAllowance};

/// Provides read and reservation operations for user credits.
pub struct CreditRepo;

impl CreditRepo {
    /// Read-only pre-dispatch check. A missing balance row counts as
    /// zero remaining.
    pub async fn allowance(
        pool: &PgPool,
        user_id: DbId,
        feature: Feature,
    ) -> Result<LaunchAllowance, sqlx::Error> {
        let remaining: Option<i32> = sqlx::query_scalar(
            "SELECT credits_remaining FROM credit_balances \
             WHERE user_id = $1 AND feature = $2",
        )
        .bind(user_id)
        .bind(feature.as_str())
        .fetch_optional(pool)
        .await?;

        let remaining = remaining.unwrap_or(0);
        Ok(LaunchAllowance {
            allowed: remaining > 0,
            remaining,
        })
    }

    /// Consume one credit unit for `feature`, tagged with `job_id`.
    ///
    /// Returns `false` without mutating anything when the job id was
    /// already engaged or the balance is exhausted. The decrement is a
    /// single conditional UPDATE -- the balance can never go negative.
    pub async fn engage(
        pool: &PgPool,
        user_id: DbId,
        feature: Feature,
        job_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO credit_engagements (job_id, user_id, feature) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(job_id)
        .bind(user_id)
        .bind(feature.as_str())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::warn!(job_id, feature = %feature, "Credit already engaged for job");
            return Ok(false);
        }

        let decremented = sqlx::query(
            "UPDATE credit_balances \
             SET credits_remaining = credits_remaining - 1, updated_at = NOW() \
             WHERE user_id = $1 AND feature = $2 AND credits_remaining > 0",
        )
        .bind(user_id)
        .bind(feature.as_str())
        .execute(&mut *tx)
        .await?;

        if decremented.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Fetch a user's plan row.
    pub async fn account(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<CreditAccount>, sqlx::Error> {
        sqlx::query_as::<_, CreditAccount>(
            "SELECT user_id, plan_type, last_reset_date, created_at, updated_at \
             FROM user_credits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Fetch all per-feature balances for a user.
    pub async fn balances(pool: &PgPool, user_id: DbId) -> Result<Vec<CreditBalance>, sqlx::Error> {
        sqlx::query_as::<_, CreditBalance>(
            "SELECT feature, credits_remaining FROM credit_balances \
             WHERE user_id = $1 ORDER BY feature",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
