//! REST client for the execution service HTTP endpoints.
//!
//! Wraps the service's analysis API (dispatch, cancellation) using
//! [`reqwest`]. The service is free to answer a dispatch with either an
//! acknowledgement or the finished result; both are modelled by
//! [`DispatchReply`] and the caller never assumes which path occurs.

use serde::Serialize;

use quantdesk_core::content::{normalize_content, AnalysisContent};
use quantdesk_core::feature::Feature;
use quantdesk_core::types::DbId;

/// HTTP client for the execution service.
pub struct ExecutorApi {
    client: reqwest::Client,
    base_url: String,
}

/// Body of a dispatch request.
#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    job_id: DbId,
    feature: Feature,
    payload: &'a serde_json::Value,
}

/// Interpretation of a successful dispatch response.
#[derive(Debug, Clone)]
pub enum DispatchReply {
    /// The request was queued; completion arrives via the job record.
    Ack,
    /// The service answered synchronously with the finished result.
    Completed(AnalysisContent),
}

/// Errors from the execution-service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Execution service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ExecutorApiError {
    /// Whether this failure may resolve on its own. Transient failures
    /// are absorbed by the poll/push/timeout machinery; only definitive
    /// rejections mark the job as failed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Api { status, .. } => *status >= 500,
        }
    }
}

impl ExecutorApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `https://exec.internal`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Dispatch an analysis request.
    ///
    /// Sends `POST /analyses` with the job id, feature, and opaque
    /// payload. A 2xx response with a body this client cannot interpret
    /// counts as an acknowledgement -- the service is known to emit
    /// non-JSON keep-alive bodies.
    pub async fn dispatch(
        &self,
        job_id: DbId,
        feature: Feature,
        payload: &serde_json::Value,
    ) -> Result<DispatchReply, ExecutorApiError> {
        let body = DispatchBody {
            job_id,
            feature,
            payload,
        };

        let response = self
            .client
            .post(format!("{}/analyses", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ExecutorApiError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(parse_dispatch_body(&text))
    }

    /// Ask the service to cancel a queued or running analysis.
    pub async fn cancel(&self, job_id: DbId) -> Result<(), ExecutorApiError> {
        let response = self
            .client
            .post(format!("{}/analyses/{job_id}/cancel", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ExecutorApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Interpret a 2xx dispatch response body.
///
/// `{"status": "completed", "result": ...}` is an immediate synchronous
/// result; everything else -- an explicit ack, an unknown JSON shape, or a
/// non-JSON keep-alive body -- is an acknowledgement.
fn parse_dispatch_body(text: &str) -> DispatchReply {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        tracing::debug!("Non-JSON dispatch response body, treating as ack");
        return DispatchReply::Ack;
    };

    if value.get("status").and_then(|s| s.as_str()) == Some("completed") {
        let result = value.get("result").cloned().unwrap_or(serde_json::Value::Null);
        return DispatchReply::Completed(normalize_content(&result));
    }

    DispatchReply::Ack
}
