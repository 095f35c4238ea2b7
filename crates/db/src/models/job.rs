//! Analysis job entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;

use quantdesk_core::status::{JobStatus, StatusId};
use quantdesk_core::types::{DbId, Timestamp};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalysisJob {
    pub id: DbId,
    pub user_id: DbId,
    pub feature: String,
    pub status_id: StatusId,
    pub request_payload: serde_json::Value,
    pub response_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AnalysisJob {
    /// Decode the status column. `None` for IDs unknown to this client
    /// version.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    /// Whether this row is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(JobStatus::is_terminal)
    }
}

/// DTO for creating a new job row before dispatch.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub feature: quantdesk_core::feature::Feature,
    pub request_payload: serde_json::Value,
}

/// Partial update applied to an existing job row. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub response_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job_with_status(status_id: StatusId) -> AnalysisJob {
        AnalysisJob {
            id: 1,
            user_id: 7,
            feature: "reports".into(),
            status_id,
            request_payload: serde_json::json!({}),
            response_payload: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn terminal_detection_follows_status() {
        assert!(!job_with_status(JobStatus::Queued.id()).is_terminal());
        assert!(!job_with_status(JobStatus::Running.id()).is_terminal());
        assert!(job_with_status(JobStatus::Done.id()).is_terminal());
        assert!(job_with_status(JobStatus::TimedOut.id()).is_terminal());
    }

    #[test]
    fn unknown_status_is_not_terminal() {
        let job = job_with_status(42);
        assert_eq!(job.status(), None);
        assert!(!job.is_terminal());
    }
}
