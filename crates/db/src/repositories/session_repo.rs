//! Repository for the `user_sessions` table.
//!
//! Session rows are deactivated, never deleted, during normal operation --
//! a refresh racing a takeover must still find its row. `cleanup_stale`
//! is the only deletion path and only touches rows unseen for days.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::session::{ActivateSession, SessionRecord};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "session_id, user_id, device_info, is_active, \
                       last_seen, created_at, updated_at";

/// Provides CRUD operations for device sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Activate a device session, deactivating every other session the
    /// user holds. Upserts so a returning device reclaims its own row.
    ///
    /// Both statements run in one transaction so an observer never sees
    /// two active sessions for the same user.
    pub async fn activate(
        pool: &PgPool,
        input: &ActivateSession,
    ) -> Result<SessionRecord, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO user_sessions (session_id, user_id, device_info, is_active, last_seen) \
             VALUES ($1, $2, $3, TRUE, NOW()) \
             ON CONFLICT (session_id) DO UPDATE \
             SET is_active = TRUE, device_info = $3, last_seen = NOW(), updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(&input.session_id)
            .bind(input.user_id)
            .bind(&input.device_info)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE user_sessions \
             SET is_active = FALSE, updated_at = NOW() \
             WHERE user_id = $1 AND session_id <> $2 AND is_active",
        )
        .bind(input.user_id)
        .bind(&input.session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Find a session by its ID.
    pub async fn find_by_session_id(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_sessions WHERE session_id = $1");
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(session_id)
            .fetch_optional(pool)
            .await
    }

    /// Refresh `last_seen` for a still-active session. Returns `false`
    /// if the session is missing or no longer active (last-writer-wins --
    /// a deactivated session does not resurrect itself by touching).
    pub async fn touch(pool: &PgPool, session_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions \
             SET last_seen = NOW(), updated_at = NOW() \
             WHERE session_id = $1 AND is_active",
        )
        .bind(session_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deactivate a single session. Returns `true` if the row was updated.
    pub async fn deactivate(pool: &PgPool, session_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions \
             SET is_active = FALSE, updated_at = NOW() \
             WHERE session_id = $1 AND is_active",
        )
        .bind(session_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete sessions unseen since `cutoff`. Returns the deleted count.
    pub async fn cleanup_stale(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE last_seen < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
