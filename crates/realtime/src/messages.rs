//! Change-notification wire messages and parser.
//!
//! The stream sends JSON messages shaped `{"type": "<kind>", "data":
//! {...}}`. This module deserializes them into a strongly-typed
//! [`ChangeMessage`] enum.

use serde::{Deserialize, Serialize};

use quantdesk_core::status::StatusId;
use quantdesk_core::types::DbId;

/// All known change-notification message types.
///
/// Deserialized via the tagged `"type"` field with associated `"data"`
/// content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChangeMessage {
    /// The server confirmed the subscription filter.
    #[serde(rename = "subscribed")]
    Subscribed(SubscribedData),

    /// A row in `jobs` changed.
    #[serde(rename = "job_changed")]
    JobChanged(JobChange),

    /// A row in `user_sessions` changed.
    #[serde(rename = "session_changed")]
    SessionChanged(SessionChange),

    /// Periodic keep-alive from the server.
    #[serde(rename = "keepalive")]
    Keepalive,
}

/// Payload for `subscribed` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedData {
    pub user_id: DbId,
}

/// Payload for `job_changed` messages: the changed row's fields this
/// client cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct JobChange {
    pub id: DbId,
    pub user_id: DbId,
    pub feature: String,
    pub status_id: StatusId,
    #[serde(default)]
    pub response_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Payload for `session_changed` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionChange {
    pub session_id: String,
    pub user_id: DbId,
    pub is_active: bool,
}

/// Subscription request sent after connecting.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub user_id: DbId,
}

impl SubscribeRequest {
    /// Encode the outbound subscribe frame.
    pub fn to_frame(&self) -> String {
        serde_json::json!({
            "type": "subscribe",
            "data": { "user_id": self.user_id },
        })
        .to_string()
    }
}

/// Parse a change-notification text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log unknown types and continue.
pub fn parse_message(text: &str) -> Result<ChangeMessage, serde_json::Error> {
    serde_json::from_str(text)
}
