//! Connection lifecycle for the realtime stream.
//!
//! [`RealtimeBridge`] owns a long-lived task running connect ->
//! process -> reconnect for one signed-in user. It is started at
//! sign-in and shut down at sign-out; the registry and the monitor's
//! deactivation channel are the only things it talks to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quantdesk_core::types::DbId;
use quantdesk_engine::DeliveryRegistry;
use quantdesk_session::SessionDeactivated;

use crate::client::RealtimeClient;
use crate::processor::process_messages;
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Handle to one user's realtime subscription.
pub struct RealtimeBridge {
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task_handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RealtimeBridge {
    /// Spawn the connection task and return a shared handle.
    pub fn start(
        ws_url: String,
        user_id: DbId,
        session_id: String,
        registry: Arc<DeliveryRegistry>,
        deactivations: mpsc::UnboundedSender<SessionDeactivated>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let connected = Arc::new(AtomicBool::new(false));
        let connected_clone = Arc::clone(&connected);
        let cancel_clone = cancel.clone();

        let task_handle = tokio::spawn(async move {
            let client = RealtimeClient::new(user_id, ws_url);
            tracing::info!(user_id, "Realtime bridge starting");
            run_connection_loop(
                &client,
                &session_id,
                &registry,
                &deactivations,
                &connected_clone,
                &cancel_clone,
            )
            .await;
            tracing::info!(user_id, "Realtime bridge exited");
        });

        Arc::new(Self {
            connected,
            cancel,
            task_handle: std::sync::Mutex::new(Some(task_handle)),
        })
    }

    /// Whether the stream is currently connected. While `false`,
    /// in-flight jobs rely entirely on the polling channel.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop the connection task, waiting briefly for a clean exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .task_handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        }
    }
}

/// Core connection loop: connect -> process frames -> reconnect.
///
/// Runs until the cancellation token is triggered. Each pass through the
/// loop re-subscribes from scratch, so a reconnect never leaves a gap in
/// the filter; any events missed while disconnected are recovered by the
/// polling channel and deduplicated by the registry.
async fn run_connection_loop(
    client: &RealtimeClient,
    session_id: &str,
    registry: &Arc<DeliveryRegistry>,
    deactivations: &mpsc::UnboundedSender<SessionDeactivated>,
    connected: &Arc<AtomicBool>,
    cancel: &CancellationToken,
) {
    let reconnect_config = ReconnectConfig::default();

    loop {
        let conn = match client.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(
                    user_id = client.user_id(),
                    error = %e,
                    "Connection failed, entering reconnect loop",
                );
                match reconnect_loop(client, &reconnect_config, cancel).await {
                    Some(conn) => conn,
                    None => return, // cancelled
                }
            }
        };

        connected.store(true, Ordering::SeqCst);
        tracing::info!(user_id = client.user_id(), client_id = %conn.client_id, "Realtime stream connected");

        let mut ws_stream = conn.ws_stream;
        process_messages(
            &mut ws_stream,
            client.user_id(),
            session_id,
            registry,
            deactivations,
        )
        .await;

        connected.store(false, Ordering::SeqCst);

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!(
            user_id = client.user_id(),
            "Realtime stream lost, polling covers in-flight jobs until resubscribed",
        );
    }
}
