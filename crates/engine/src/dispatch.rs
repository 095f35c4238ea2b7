//! Dispatch seam between the launcher and the execution service.
//!
//! A trait so launch-flow tests run against a fake service; the
//! production implementation delegates to [`ExecutorApi`].

use async_trait::async_trait;

use quantdesk_core::feature::Feature;
use quantdesk_core::types::DbId;
use quantdesk_executor::{DispatchReply, ExecutorApi};

/// Dispatch failure, split by whether it is worth waiting out.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// May resolve on its own; the job stays alive on the poll/push
    /// channels until its deadline.
    #[error("Transient dispatch failure: {0}")]
    Transient(String),

    /// The service definitively refused the request; the job is dead.
    #[error("Dispatch rejected: {0}")]
    Rejected(String),
}

/// Sends an analysis request to the execution service.
#[async_trait]
pub trait AnalysisDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        job_id: DbId,
        feature: Feature,
        payload: &serde_json::Value,
    ) -> Result<DispatchReply, DispatchError>;
}

#[async_trait]
impl AnalysisDispatcher for ExecutorApi {
    async fn dispatch(
        &self,
        job_id: DbId,
        feature: Feature,
        payload: &serde_json::Value,
    ) -> Result<DispatchReply, DispatchError> {
        ExecutorApi::dispatch(self, job_id, feature, payload)
            .await
            .map_err(|e| {
                if e.is_transient() {
                    DispatchError::Transient(e.to_string())
                } else {
                    DispatchError::Rejected(e.to_string())
                }
            })
    }
}
