//! The session monitor.
//!
//! One validation loop per signed-in device: every cycle it reads this
//! device's session record, recreates it if a transient read raced a
//! fresh sign-in, and reacts when another device has taken over. The
//! realtime path and the polling path funnel into one decision function,
//! and that function checks the in-flight job counter first -- a user
//! mid-analysis is never signed out, whatever channel says so.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quantdesk_core::types::DbId;
use quantdesk_db::models::session::ActivateSession;
use quantdesk_engine::ActiveJobs;
use quantdesk_events::{DeskEvent, EventBus};

use crate::auth::{AuthContext, CurrentUser};
use crate::debounce::AuthSignal;
use crate::device::DeviceState;
use crate::store::{SessionStore, SessionStoreError};

/// Default validation cadence.
pub const VALIDATION_INTERVAL: Duration = Duration::from_secs(60);

/// Notification that a session was deactivated in the store, as observed
/// by the realtime stream. The bridge forwards these; only the monitor
/// decides what to do about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDeactivated {
    pub session_id: String,
}

/// Which path noticed the deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationOrigin {
    /// The 60s validation loop read `is_active = false`.
    ValidationTick,
    /// The realtime stream pushed the change.
    Realtime,
    /// A settled null auth signal was confirmed against the store.
    AuthSettled,
    /// The user asked to sign out on this device.
    Voluntary,
}

/// Outcome of the shared deactivation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutDecision {
    /// Nobody is signed in locally; nothing to do.
    NotSignedIn,
    /// Jobs are in flight; sign-out is deferred to a later cycle.
    Deferred { active_jobs: usize },
    /// Local state was cleared. `voluntary` reflects whether the user
    /// initiated it (which suppresses the conflict notification).
    SignedOut { voluntary: bool },
}

/// Per-device session monitor.
pub struct SessionMonitor {
    store: Arc<dyn SessionStore>,
    auth: Arc<AuthContext>,
    device: Arc<DeviceState>,
    active: Arc<ActiveJobs>,
    bus: Arc<EventBus>,
    interval: Duration,
    /// Device description sent at sign-in, reused when a missing record
    /// has to be recreated mid-cycle.
    device_info: std::sync::Mutex<serde_json::Value>,
}

impl SessionMonitor {
    pub fn new(
        store: Arc<dyn SessionStore>,
        auth: Arc<AuthContext>,
        device: Arc<DeviceState>,
        active: Arc<ActiveJobs>,
        bus: Arc<EventBus>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            auth,
            device,
            active,
            bus,
            interval,
            device_info: std::sync::Mutex::new(serde_json::Value::Null),
        }
    }

    /// Activate this device's session and install the auth context.
    ///
    /// Activation deactivates every other session the user holds
    /// (last-writer-wins in the store). Any stale voluntary-logout flag
    /// is cleared so it cannot suppress a future, genuine conflict.
    pub async fn sign_in(
        &self,
        user_id: DbId,
        device_info: serde_json::Value,
    ) -> Result<(), SessionStoreError> {
        self.device.take_voluntary_logout();
        *self.lock_device_info() = device_info.clone();

        let session_id = self.device.session_id(user_id);
        self.store
            .activate(&ActivateSession {
                session_id: session_id.clone(),
                user_id,
                device_info,
            })
            .await?;
        self.auth.init(CurrentUser { user_id });
        tracing::info!(user_id, session_id, "Session activated");
        Ok(())
    }

    /// User-initiated sign-out.
    ///
    /// Sets the voluntary flag, deactivates the store row, and then runs
    /// the same decision function as every other path. With jobs in
    /// flight the local teardown is deferred -- the flag stays set, so
    /// when a later cycle completes the sign-out no conflict
    /// notification is emitted for it.
    pub async fn sign_out(&self) -> Result<SignOutDecision, SessionStoreError> {
        let Some(user) = self.auth.current() else {
            return Ok(SignOutDecision::NotSignedIn);
        };
        self.device.set_voluntary_logout();

        let session_id = self.device.session_id(user.user_id);
        self.store.deactivate(&session_id).await?;
        Ok(self.apply_deactivation(DeactivationOrigin::Voluntary).await)
    }

    /// Run the validation loop plus the push-event listeners until
    /// cancelled. The senders for both channels are expected to outlive
    /// the monitor; a closed channel stops the loop.
    pub async fn run(
        self: Arc<Self>,
        mut deactivations: mpsc::UnboundedReceiver<SessionDeactivated>,
        mut auth_signals: mpsc::UnboundedReceiver<AuthSignal>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Session monitor started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.validate_tick().await;
                }
                signal = deactivations.recv() => match signal {
                    Some(signal) => {
                        self.on_realtime_deactivation(signal).await;
                    }
                    None => {
                        tracing::info!("Deactivation channel closed, monitor stopping");
                        break;
                    }
                },
                signal = auth_signals.recv() => match signal {
                    Some(signal) => {
                        self.on_auth_signal(signal).await;
                    }
                    None => {
                        tracing::info!("Auth signal channel closed, monitor stopping");
                        break;
                    }
                },
            }
        }
    }

    /// One validation cycle.
    pub async fn validate_tick(&self) {
        let Some(user) = self.auth.current() else {
            return;
        };
        let session_id = self.device.session_id(user.user_id);

        match self.store.find(&session_id).await {
            Ok(None) => {
                // A transient read can race a fresh sign-in; the record
                // is recreated, never treated as a sign-out.
                tracing::warn!(session_id, "Session record missing, recreating");
                let input = ActivateSession {
                    session_id: session_id.clone(),
                    user_id: user.user_id,
                    device_info: self.lock_device_info().clone(),
                };
                if let Err(e) = self.store.activate(&input).await {
                    tracing::warn!(session_id, error = %e, "Failed to recreate session record");
                }
            }
            Ok(Some(record)) if !record.is_active => {
                self.apply_deactivation(DeactivationOrigin::ValidationTick)
                    .await;
            }
            Ok(Some(_)) => {
                if let Err(e) = self.store.touch(&session_id).await {
                    tracing::warn!(session_id, error = %e, "Failed to refresh last_seen");
                }
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Session validation read failed");
            }
        }
    }

    /// Realtime path: the bridge observed `is_active = false` for a
    /// session id. Only this device's own session is acted on, through
    /// the same decision function as the validation loop.
    pub async fn on_realtime_deactivation(&self, signal: SessionDeactivated) {
        let Some(user) = self.auth.current() else {
            return;
        };
        if signal.session_id != self.device.session_id(user.user_id) {
            tracing::debug!(
                session_id = signal.session_id,
                "Ignoring deactivation for another device",
            );
            return;
        }
        self.apply_deactivation(DeactivationOrigin::Realtime).await;
    }

    /// A settled auth signal from the debouncer.
    ///
    /// A null is re-verified against the store before anything is
    /// cleared -- if the record is still active, the null was a transient
    /// artifact of a token refresh and is ignored.
    pub async fn on_auth_signal(&self, signal: AuthSignal) {
        match signal {
            AuthSignal::SessionPresent { user_id } => {
                if self.auth.current().is_none() {
                    self.auth.init(CurrentUser { user_id });
                }
            }
            AuthSignal::SessionNull => {
                let Some(user) = self.auth.current() else {
                    return;
                };
                let session_id = self.device.session_id(user.user_id);
                match self.store.find(&session_id).await {
                    Ok(Some(record)) if record.is_active => {
                        tracing::debug!(session_id, "Transient null auth signal ignored");
                    }
                    Ok(_) => {
                        self.apply_deactivation(DeactivationOrigin::AuthSettled)
                            .await;
                    }
                    Err(e) => {
                        // Never clear local state on an unverified null.
                        tracing::warn!(session_id, error = %e, "Could not verify null auth signal");
                    }
                }
            }
        }
    }

    /// The shared deactivation decision. The active-job guard is
    /// evaluated before anything else, including the voluntary flag: in-
    /// flight work defers the sign-out regardless of who initiated it.
    pub async fn apply_deactivation(&self, origin: DeactivationOrigin) -> SignOutDecision {
        let Some(user) = self.auth.current() else {
            return SignOutDecision::NotSignedIn;
        };

        let in_flight = self.active.count();
        if in_flight > 0 {
            tracing::info!(
                user_id = user.user_id,
                ?origin,
                in_flight,
                "Sign-out deferred, jobs in flight",
            );
            return SignOutDecision::Deferred {
                active_jobs: in_flight,
            };
        }

        let voluntary = self.device.take_voluntary_logout();
        let session_id = self.device.session_id(user.user_id);
        if let Err(e) = self.store.deactivate(&session_id).await {
            // Usually already inactive in the store; this is cleanup.
            tracing::debug!(session_id, error = %e, "Deactivate during sign-out failed");
        }
        self.auth.teardown();

        tracing::info!(user_id = user.user_id, ?origin, voluntary, "Signed out");
        if !voluntary {
            self.bus.publish(DeskEvent::SessionConflict {
                user_id: user.user_id,
                session_id,
            });
        }
        SignOutDecision::SignedOut { voluntary }
    }

    fn lock_device_info(&self) -> std::sync::MutexGuard<'_, serde_json::Value> {
        self.device_info
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
