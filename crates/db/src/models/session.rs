//! Device session model and DTOs.

use sqlx::FromRow;

use quantdesk_core::types::{DbId, Timestamp};

/// A row from the `user_sessions` table.
///
/// `session_id` is `"<user_id>:<device_id>"` -- one row per (user, device).
/// At most one row per user is active at a time; activating a session
/// deactivates every other session for that user.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: DbId,
    pub device_info: serde_json::Value,
    pub is_active: bool,
    pub last_seen: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for activating (creating or reclaiming) a device session.
#[derive(Debug, Clone)]
pub struct ActivateSession {
    pub session_id: String,
    pub user_id: DbId,
    pub device_info: serde_json::Value,
}
