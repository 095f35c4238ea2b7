//! Process-local count of in-flight jobs.
//!
//! Incremented on dispatch, decremented when the terminal outcome is
//! delivered (or the handle is detached unfired). The session monitor
//! reads it before acting on any deactivation signal -- a user with work
//! in flight is never signed out.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared in-flight job counter.
#[derive(Debug, Default)]
pub struct ActiveJobs {
    count: AtomicUsize,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job entering flight.
    pub fn acquire(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a job leaving flight.
    pub fn release(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        if previous == 0 {
            // Keep the counter sane; an unmatched release is a bug upstream.
            self.count.store(0, Ordering::SeqCst);
            tracing::warn!("ActiveJobs released below zero");
        }
    }

    /// Current number of in-flight jobs.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_round_trip() {
        let active = ActiveJobs::new();
        assert_eq!(active.count(), 0);

        active.acquire();
        active.acquire();
        assert_eq!(active.count(), 2);

        active.release();
        assert_eq!(active.count(), 1);
        active.release();
        assert_eq!(active.count(), 0);
    }

    #[test]
    fn release_below_zero_clamps() {
        let active = ActiveJobs::new();
        active.release();
        assert_eq!(active.count(), 0);
    }
}
