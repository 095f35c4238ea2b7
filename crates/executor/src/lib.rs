//! HTTP client for the external analysis execution service.
//!
//! Dispatches analysis requests and interprets the reply, which is either
//! an acknowledgement (the service will write its result into the job
//! record out-of-band) or an immediate synchronous result.

pub mod api;

pub use api::{DispatchReply, ExecutorApi, ExecutorApiError};
