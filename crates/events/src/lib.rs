//! In-process notification events.
//!
//! The [`EventBus`] is the single feed the UI layer watches for
//! user-visible notifications: terminal job outcomes and session
//! conflicts. The delivery registry's fire-once contract guarantees at
//! most one job event is published per job.

pub mod bus;

pub use bus::{DeskEvent, EventBus};
