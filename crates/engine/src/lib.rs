//! Job orchestration engine.
//!
//! Coordinates the life of an analysis job from credit reservation
//! through dispatch to exactly-once result delivery:
//!
//! - [`registry::DeliveryRegistry`] -- at-most-once fan-in from the
//!   realtime, polling, and synchronous-dispatch producers into one
//!   completion handler per job;
//! - [`poller`] -- the pull channel: progressive-interval status checks
//!   with an absolute deadline;
//! - [`launcher::JobLauncher`] -- the two-phase credit flow and task
//!   wiring for a single launch;
//! - [`active_jobs::ActiveJobs`] -- the in-flight counter the session
//!   monitor consults before signing anyone out.

pub mod active_jobs;
pub mod dispatch;
pub mod launcher;
pub mod poller;
pub mod registry;
pub mod store;

pub use active_jobs::ActiveJobs;
pub use dispatch::{AnalysisDispatcher, DispatchError};
pub use launcher::{JobHandle, JobLauncher, LaunchError, LaunchRequest};
pub use poller::PollSchedule;
pub use registry::{DeliveryDisposition, DeliveryHandler, DeliveryRegistry};
pub use store::{CreditLedger, JobStore, PgStore, StoreError};
