//! Realtime bridge to the store's change-notification stream.
//!
//! Subscribes over WebSocket to row-change events for the signed-in
//! user's jobs and sessions, feeds terminal job results into the
//! delivery registry (push channel), and forwards own-session
//! deactivations to the session monitor. Reconnects with exponential
//! backoff; while disconnected, in-flight jobs are fully covered by the
//! polling channel and any duplicate delivery after resubscribe is
//! absorbed by the registry.

pub mod bridge;
pub mod client;
pub mod messages;
pub mod processor;
pub mod reconnect;

pub use bridge::RealtimeBridge;
pub use client::{RealtimeClient, RealtimeClientError};
