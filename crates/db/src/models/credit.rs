//! Credit ledger models and DTOs.

use chrono::NaiveDate;
use sqlx::FromRow;

use quantdesk_core::types::{DbId, Timestamp};

/// A row from the `user_credits` table (one per user).
#[derive(Debug, Clone, FromRow)]
pub struct CreditAccount {
    pub user_id: DbId,
    pub plan_type: String,
    pub last_reset_date: NaiveDate,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `credit_balances` table (one per user and feature).
#[derive(Debug, Clone, FromRow)]
pub struct CreditBalance {
    pub feature: String,
    pub credits_remaining: i32,
}

/// Result of the read-only pre-dispatch check.
#[derive(Debug, Clone, Copy)]
pub struct LaunchAllowance {
    pub allowed: bool,
    pub remaining: i32,
}
