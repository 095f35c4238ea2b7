//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`DeskEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the application.

use serde::Serialize;
use tokio::sync::broadcast;

use quantdesk_core::content::AnalysisContent;
use quantdesk_core::feature::Feature;
use quantdesk_core::outcome::DeliverySource;
use quantdesk_core::types::DbId;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A user-visible notification event.
#[derive(Debug, Clone, Serialize)]
pub enum DeskEvent {
    /// An analysis job completed successfully.
    JobCompleted {
        job_id: DbId,
        user_id: DbId,
        feature: Feature,
        content: AnalysisContent,
        /// Which channel won the delivery race.
        source: DeliverySource,
    },

    /// An analysis job failed on the execution side.
    JobFailed {
        job_id: DbId,
        user_id: DbId,
        feature: Feature,
        message: String,
    },

    /// An analysis job hit the absolute deadline. Distinct from
    /// `JobFailed` so the UI can suggest a retry.
    JobTimedOut {
        job_id: DbId,
        user_id: DbId,
        feature: Feature,
    },

    /// Another device took over this user's session and the local
    /// session was signed out. Not published for voluntary sign-outs.
    SessionConflict { user_id: DbId, session_id: String },
}

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so any number of subscribers can
/// independently receive every published [`DeskEvent`].
pub struct EventBus {
    sender: broadcast::Sender<DeskEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped --
    /// a headless embedder without a notification surface is valid.
    pub fn publish(&self, event: DeskEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
