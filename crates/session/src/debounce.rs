//! Debouncing for raw auth-provider signals.
//!
//! Token refreshes, tab refocus, and initial load all emit auth
//! transitions, and a burst can contain a transient null session that is
//! not a real sign-out. [`AuthDebouncer`] is a small state machine --
//! observing, debouncing, settled -- that collapses each burst to its
//! final signal. Whoever consumes the settled stream still re-verifies a
//! null against the store before clearing anything (see the monitor).

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quantdesk_core::types::DbId;

/// Default trailing debounce window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// A raw (or settled) auth transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    /// The provider reports a live session for this user.
    SessionPresent { user_id: DbId },
    /// The provider reports no session. May be transient.
    SessionNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the first signal of a burst.
    Observing,
    /// A burst is in progress; the window restarts on every new signal.
    Debouncing,
}

/// Trailing-edge debouncer for [`AuthSignal`]s.
pub struct AuthDebouncer {
    window: Duration,
}

impl AuthDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Pump raw signals into settled signals until the raw channel
    /// closes or `cancel` is triggered.
    ///
    /// Each burst settles to its *last* signal once the window passes
    /// with no new input.
    pub async fn run(
        self,
        mut raw: mpsc::UnboundedReceiver<AuthSignal>,
        settled: mpsc::UnboundedSender<AuthSignal>,
        cancel: CancellationToken,
    ) {
        let mut phase = Phase::Observing;
        let mut latest: Option<AuthSignal> = None;

        loop {
            match phase {
                Phase::Observing => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        signal = raw.recv() => match signal {
                            Some(signal) => {
                                latest = Some(signal);
                                phase = Phase::Debouncing;
                            }
                            None => return,
                        },
                    }
                }
                Phase::Debouncing => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        signal = raw.recv() => match signal {
                            Some(signal) => {
                                tracing::trace!(?signal, "Auth signal superseded within window");
                                latest = Some(signal);
                            }
                            None => {
                                if let Some(signal) = latest.take() {
                                    let _ = settled.send(signal);
                                }
                                return;
                            }
                        },
                        _ = tokio::time::sleep(self.window) => {
                            if let Some(signal) = latest.take() {
                                tracing::debug!(?signal, "Auth signal settled");
                                let _ = settled.send(signal);
                            }
                            phase = Phase::Observing;
                        }
                    }
                }
            }
        }
    }
}

impl Default for AuthDebouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}
