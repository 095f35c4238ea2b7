//! Status polling: the pull half of result delivery.
//!
//! One task per job drives store reads on a progressive interval
//! schedule -- the first check waits a full minute (most jobs take at
//! least that long), then the cadence tightens. An absolute wall-clock
//! deadline is enforced independently of the schedule: before each sleep
//! the loop verifies the next check would still land inside the window,
//! and otherwise declares the job timed out on the spot.
//!
//! Checks for one job are strictly sequential; there is never more than
//! one read in flight per job id.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use quantdesk_core::outcome::{terminal_outcome, DeliverySource, JobOutcome};
use quantdesk_core::types::DbId;

use crate::registry::DeliveryRegistry;
use crate::store::{JobStore, StoreError};

/// Progressive check intervals and the absolute deadline.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    /// Delay before the first check.
    pub first: Duration,
    /// Delay between the first and second checks.
    pub second: Duration,
    /// Delay between all subsequent checks.
    pub steady: Duration,
    /// Hard ceiling measured from job start. A check is only scheduled
    /// if it lands strictly inside this window.
    pub deadline: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            first: Duration::from_secs(60),
            second: Duration::from_secs(30),
            steady: Duration::from_secs(15),
            deadline: Duration::from_secs(300),
        }
    }
}

impl PollSchedule {
    /// Interval to wait before check number `checks_done + 1`.
    pub fn interval_after(&self, checks_done: u32) -> Duration {
        match checks_done {
            0 => self.first,
            1 => self.second,
            _ => self.steady,
        }
    }
}

/// Poll one job until a terminal result is delivered, the deadline
/// elapses, or `cancel` is triggered.
///
/// Transient store failures (including undecodable rows -- the store may
/// serve half-written or newer-schema data) are logged and absorbed; the
/// schedule continues and the deadline is never restarted. A missing job
/// row is surfaced as an `error` outcome -- that is an inconsistency, not
/// a blip.
pub async fn poll_job(
    store: Arc<dyn JobStore>,
    registry: Arc<DeliveryRegistry>,
    job_id: DbId,
    schedule: PollSchedule,
    cancel: CancellationToken,
) {
    let started = tokio::time::Instant::now();
    let mut checks_done: u32 = 0;

    loop {
        let interval = schedule.interval_after(checks_done);

        if started.elapsed() + interval >= schedule.deadline {
            tracing::info!(
                job_id,
                elapsed_secs = started.elapsed().as_secs(),
                "Poll deadline reached, marking job timed out",
            );
            // Best effort: the guard in the store keeps a concurrent
            // terminal write from the service authoritative.
            match store.mark_timed_out(job_id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(job_id, "Job already terminal in store at timeout");
                }
                Err(e) => {
                    tracing::warn!(job_id, error = %e, "Failed to persist timed_out status");
                }
            }
            registry.deliver(job_id, JobOutcome::TimedOut, DeliverySource::Poll);
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(job_id, "Polling cancelled");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        checks_done += 1;

        match store.get_job(job_id).await {
            Ok(job) => {
                let Some(status) = job.status() else {
                    tracing::warn!(
                        job_id,
                        status_id = job.status_id,
                        "Unknown job status, continuing to poll",
                    );
                    continue;
                };
                if let Some(outcome) = terminal_outcome(
                    status,
                    job.response_payload.as_ref(),
                    job.error_message.as_deref(),
                ) {
                    registry.deliver(job_id, outcome, DeliverySource::Poll);
                    return;
                }
                tracing::debug!(job_id, status = ?status, "Job still in flight");
            }
            Err(StoreError::JobNotFound(_)) => {
                tracing::error!(job_id, "Job row missing from store");
                registry.deliver(
                    job_id,
                    JobOutcome::Error {
                        message: "job record missing from store".into(),
                    },
                    DeliverySource::Poll,
                );
                return;
            }
            Err(e) => {
                // Transient (network, undecodable row). Keep the schedule.
                tracing::warn!(job_id, error = %e, "Status check failed, will retry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_are_progressive() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.interval_after(0), Duration::from_secs(60));
        assert_eq!(schedule.interval_after(1), Duration::from_secs(30));
        assert_eq!(schedule.interval_after(2), Duration::from_secs(15));
        assert_eq!(schedule.interval_after(17), Duration::from_secs(15));
    }
}
