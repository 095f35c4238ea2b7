//! Delivery-channel vocabulary shared by the producers (realtime push,
//! status polling, synchronous dispatch replies) and the consumer-facing
//! delivery registry.

use serde::Serialize;

use crate::content::AnalysisContent;

/// Which channel produced a terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySource {
    /// Realtime change-notification stream.
    Push,
    /// Status polling loop.
    Poll,
    /// Immediate synchronous result on the dispatch HTTP call itself.
    Dispatch,
}

/// Terminal outcome of an analysis job, as handed to the registered
/// completion handler. Exactly one outcome is delivered per job.
#[derive(Debug, Clone, Serialize)]
pub enum JobOutcome {
    /// The job completed; content has been through shape normalization.
    Done(AnalysisContent),
    /// The job failed on the execution side (or the store lost the row).
    Error { message: String },
    /// The absolute deadline elapsed before any terminal result arrived.
    TimedOut,
}

impl JobOutcome {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Done(_) => "done",
            Self::Error { .. } => "error",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Build the outcome for a job record in a terminal status.
///
/// Returns `None` for non-terminal statuses. Both delivery channels map
/// store rows through this one function so push and poll agree on what a
/// given row means.
pub fn terminal_outcome(
    status: crate::status::JobStatus,
    response_payload: Option<&serde_json::Value>,
    error_message: Option<&str>,
) -> Option<JobOutcome> {
    use crate::status::JobStatus;

    match status {
        JobStatus::Done => {
            let content = match response_payload {
                Some(payload) => crate::content::normalize_content(payload),
                None => crate::content::normalize_content(&serde_json::Value::Null),
            };
            Some(JobOutcome::Done(content))
        }
        JobStatus::Error => Some(JobOutcome::Error {
            message: error_message.unwrap_or("analysis failed").to_string(),
        }),
        JobStatus::TimedOut => Some(JobOutcome::TimedOut),
        JobStatus::Queued | JobStatus::Running => None,
    }
}
