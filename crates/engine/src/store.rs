//! Store seams for the orchestration engine.
//!
//! The poller and launcher run against these traits so their timing and
//! policy behaviour is testable with in-memory fakes; [`PgStore`] is the
//! production implementation backed by the repository layer.

use async_trait::async_trait;

use quantdesk_core::feature::Feature;
use quantdesk_core::types::DbId;
use quantdesk_db::models::credit::LaunchAllowance;
use quantdesk_db::models::job::{AnalysisJob, CreateJob, JobPatch};
use quantdesk_db::repositories::{CreditRepo, JobRepo};
use quantdesk_db::DbPool;

/// Failures surfaced by the store seams.
///
/// Everything except `JobNotFound` is transient from the orchestration
/// layer's point of view: the schedule keeps going and the absolute
/// deadline is the only thing that gives up on a job.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The job row does not exist -- a store inconsistency, surfaced.
    #[error("Job {0} not found")]
    JobNotFound(DbId),

    /// A row exists but could not be decoded. Treated like a transient
    /// failure: the row may be mid-write or from a newer schema.
    #[error("Undecodable store row: {0}")]
    Malformed(String),

    /// The store could not be reached or the query failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the polling schedule should absorb this failure.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::JobNotFound(_))
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Malformed(e.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Job record access: create, read, patch, and terminal transitions.
/// No retries or policy -- callers apply backoff.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, user_id: DbId, input: &CreateJob) -> Result<AnalysisJob, StoreError>;

    async fn get_job(&self, job_id: DbId) -> Result<AnalysisJob, StoreError>;

    async fn update_job(&self, job_id: DbId, patch: &JobPatch) -> Result<AnalysisJob, StoreError>;

    /// Terminal transitions return whether the row actually transitioned;
    /// `false` means it was already terminal (or missing) and the caller's
    /// write lost the race.
    async fn mark_done(
        &self,
        job_id: DbId,
        response_payload: &serde_json::Value,
    ) -> Result<bool, StoreError>;

    async fn mark_error(&self, job_id: DbId, message: &str) -> Result<bool, StoreError>;

    async fn mark_timed_out(&self, job_id: DbId) -> Result<bool, StoreError>;
}

/// Two-phase credit reservation.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Read-only pre-dispatch check; mutates nothing.
    async fn can_launch(
        &self,
        user_id: DbId,
        feature: Feature,
    ) -> Result<LaunchAllowance, StoreError>;

    /// Consume one unit, tagged with the job id. `false` when the balance
    /// is exhausted or the job id was already engaged; at most one
    /// decrement ever happens per job id.
    async fn engage(&self, user_id: DbId, feature: Feature, job_id: DbId)
        -> Result<bool, StoreError>;
}

/// Production store backed by the shared Postgres pool.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, user_id: DbId, input: &CreateJob) -> Result<AnalysisJob, StoreError> {
        JobRepo::create(&self.pool, user_id, input)
            .await
            .map_err(map_sqlx)
    }

    async fn get_job(&self, job_id: DbId) -> Result<AnalysisJob, StoreError> {
        JobRepo::find_by_id(&self.pool, job_id)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn update_job(&self, job_id: DbId, patch: &JobPatch) -> Result<AnalysisJob, StoreError> {
        JobRepo::update(&self.pool, job_id, patch)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn mark_done(
        &self,
        job_id: DbId,
        response_payload: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        JobRepo::mark_done(&self.pool, job_id, response_payload)
            .await
            .map_err(map_sqlx)
    }

    async fn mark_error(&self, job_id: DbId, message: &str) -> Result<bool, StoreError> {
        JobRepo::mark_error(&self.pool, job_id, message)
            .await
            .map_err(map_sqlx)
    }

    async fn mark_timed_out(&self, job_id: DbId) -> Result<bool, StoreError> {
        JobRepo::mark_timed_out(&self.pool, job_id)
            .await
            .map_err(map_sqlx)
    }
}

#[async_trait]
impl CreditLedger for PgStore {
    async fn can_launch(
        &self,
        user_id: DbId,
        feature: Feature,
    ) -> Result<LaunchAllowance, StoreError> {
        CreditRepo::allowance(&self.pool, user_id, feature)
            .await
            .map_err(map_sqlx)
    }

    async fn engage(
        &self,
        user_id: DbId,
        feature: Feature,
        job_id: DbId,
    ) -> Result<bool, StoreError> {
        CreditRepo::engage(&self.pool, user_id, feature, job_id)
            .await
            .map_err(map_sqlx)
    }
}
