//! At-most-once result delivery.
//!
//! Terminal results for one job can arrive from three producers -- the
//! realtime stream, the polling loop, and the dispatch call itself --
//! racing each other with unspecified ordering. [`DeliveryRegistry`]
//! guarantees the registered completion handler fires exactly once: the
//! first `deliver` wins, every later one is classified a duplicate.
//!
//! State is process-local, so a single mutex is the whole concurrency
//! story. The handler is always invoked *after* the lock is released.

use std::collections::HashMap;
use std::sync::Mutex;

use quantdesk_core::outcome::{DeliverySource, JobOutcome};
use quantdesk_core::types::DbId;

/// Completion callback registered for one job.
pub type DeliveryHandler = Box<dyn FnOnce(JobOutcome, DeliverySource) + Send + 'static>;

/// What happened to a `deliver` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDisposition {
    /// This delivery won the race; the handler was invoked.
    Fired,
    /// The handler had already fired; this delivery was suppressed.
    Duplicate,
    /// No registration exists -- the consumer detached before the result
    /// arrived. Dropped silently.
    NoConsumer,
}

/// Registration rejected because one already exists for the job id.
#[derive(Debug, thiserror::Error)]
#[error("Handler already registered for job {0}")]
pub struct DuplicateRegistration(pub DbId);

struct Registration {
    handler: Option<DeliveryHandler>,
    fired: bool,
}

/// Keyed store of pending completion handlers.
///
/// A fired registration is kept as a tombstone until [`unregister`]
/// (called on handle teardown) so that the losing channel's delivery is
/// observably a duplicate rather than silently vanishing.
///
/// [`unregister`]: DeliveryRegistry::unregister
#[derive(Default)]
pub struct DeliveryRegistry {
    inner: Mutex<HashMap<DbId, Registration>>,
}

impl DeliveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the completion handler for a job.
    ///
    /// Fails if a registration (fired or not) already exists for the id --
    /// a view double-subscribing is a programming error and is rejected
    /// synchronously.
    pub fn register(
        &self,
        job_id: DbId,
        handler: DeliveryHandler,
    ) -> Result<(), DuplicateRegistration> {
        let mut map = self.lock();
        if map.contains_key(&job_id) {
            tracing::error!(job_id, "Duplicate handler registration rejected");
            return Err(DuplicateRegistration(job_id));
        }
        map.insert(
            job_id,
            Registration {
                handler: Some(handler),
                fired: false,
            },
        );
        Ok(())
    }

    /// Deliver a terminal outcome from one of the channels.
    ///
    /// The fired flag is checked and set under the lock; the handler runs
    /// after the lock is released, so a slow handler cannot stall the
    /// other channel's (suppressed) delivery.
    pub fn deliver(
        &self,
        job_id: DbId,
        outcome: JobOutcome,
        source: DeliverySource,
    ) -> DeliveryDisposition {
        let handler = {
            let mut map = self.lock();
            match map.get_mut(&job_id) {
                None => {
                    tracing::debug!(
                        job_id,
                        source = ?source,
                        "Delivery dropped, consumer already detached",
                    );
                    return DeliveryDisposition::NoConsumer;
                }
                Some(reg) if reg.fired => {
                    tracing::debug!(
                        job_id,
                        source = ?source,
                        "Duplicate delivery suppressed",
                    );
                    return DeliveryDisposition::Duplicate;
                }
                Some(reg) => {
                    reg.fired = true;
                    reg.handler.take()
                }
            }
        };

        if let Some(handler) = handler {
            tracing::info!(
                job_id,
                source = ?source,
                outcome = outcome.kind(),
                "Delivering job outcome",
            );
            handler(outcome, source);
        }
        DeliveryDisposition::Fired
    }

    /// Remove a registration (fired or not).
    ///
    /// Returns `true` only if an *unfired* registration was removed --
    /// the consumer gave up before any result arrived, and the caller
    /// must undo its dispatch-time bookkeeping (the active-jobs count).
    pub fn unregister(&self, job_id: DbId) -> bool {
        match self.lock().remove(&job_id) {
            Some(reg) => !reg.fired,
            None => false,
        }
    }

    /// Number of live registrations, tombstones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DbId, Registration>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
