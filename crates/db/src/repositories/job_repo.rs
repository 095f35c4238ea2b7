//! Repository for the `jobs` table.
//!
//! Terminal transitions (`mark_done`, `mark_error`, `mark_timed_out`) are
//! conditional updates guarded on non-terminal status, so a job never
//! regresses out of a terminal state regardless of which writer -- the
//! execution service or this client -- gets there first.

use sqlx::PgPool;

use quantdesk_core::status::{JobStatus, TERMINAL_STATUSES};
use quantdesk_core::types::DbId;

use crate::models::job::{AnalysisJob, CreateJob, JobPatch};

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, user_id, feature, status_id, request_payload, \
                       response_payload, error_message, created_at, updated_at";

/// Provides CRUD operations for analysis jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new queued job, returning the created row.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        input: &CreateJob,
    ) -> Result<AnalysisJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (user_id, feature, status_id, request_payload) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(user_id)
            .bind(input.feature.as_str())
            .bind(JobStatus::Queued.id())
            .bind(&input.request_payload)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AnalysisJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Apply a partial update. Returns the updated row, or `None` if no
    /// row with that ID exists (the caller decides whether that is an
    /// inconsistency worth surfacing).
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        patch: &JobPatch,
    ) -> Result<Option<AnalysisJob>, sqlx::Error> {
        let mut sets: Vec<String> = vec!["updated_at = NOW()".into()];
        let mut bind_idx: u32 = 2;

        if patch.status.is_some() {
            sets.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if patch.response_payload.is_some() {
            sets.push(format!("response_payload = ${bind_idx}"));
            bind_idx += 1;
        }
        if patch.error_message.is_some() {
            sets.push(format!("error_message = ${bind_idx}"));
        }

        let query = format!(
            "UPDATE jobs SET {} WHERE id = $1 RETURNING {COLUMNS}",
            sets.join(", "),
        );

        let mut q = sqlx::query_as::<_, AnalysisJob>(&query).bind(id);
        if let Some(status) = patch.status {
            q = q.bind(status.id());
        }
        if let Some(ref payload) = patch.response_payload {
            q = q.bind(payload);
        }
        if let Some(ref message) = patch.error_message {
            q = q.bind(message);
        }

        q.fetch_optional(pool).await
    }

    /// Transition a job to `done` with its result payload.
    ///
    /// Returns `true` if the row transitioned, `false` if it was missing
    /// or already terminal.
    pub async fn mark_done(
        pool: &PgPool,
        id: DbId,
        response_payload: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, response_payload = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(id)
        .bind(JobStatus::Done.id())
        .bind(response_payload)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition a job to `error` with a message.
    pub async fn mark_error(pool: &PgPool, id: DbId, message: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(id)
        .bind(JobStatus::Error.id())
        .bind(message)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition a job to `timed_out`.
    ///
    /// Called by the polling loop when the absolute deadline elapses. The
    /// guard means a near-simultaneous terminal write from the execution
    /// service wins and this becomes a no-op.
    pub async fn mark_timed_out(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4, $5)",
        )
        .bind(id)
        .bind(JobStatus::TimedOut.id())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
