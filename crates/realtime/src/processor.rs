//! Frame processing loop for the change-notification stream.
//!
//! Reads raw frames, parses them into typed [`ChangeMessage`] variants,
//! feeds terminal job changes into the delivery registry as the push
//! channel, and forwards own-session deactivations to the session
//! monitor. The processor never signs anyone out itself.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use quantdesk_core::outcome::{terminal_outcome, DeliverySource};
use quantdesk_core::status::JobStatus;
use quantdesk_core::types::DbId;
use quantdesk_engine::DeliveryRegistry;
use quantdesk_session::SessionDeactivated;

use crate::messages::{parse_message, ChangeMessage, JobChange, SessionChange};

/// Process frames from a live connection until it closes or errors.
pub async fn process_messages(
    ws_stream: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    user_id: DbId,
    own_session_id: &str,
    registry: &Arc<DeliveryRegistry>,
    deactivations: &mpsc::UnboundedSender<SessionDeactivated>,
) {
    while let Some(msg_result) = ws_stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                handle_text_message(&text, user_id, own_session_id, registry, deactivations);
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!(user_id, "Ignoring binary frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(user_id, ?frame, "Realtime stream closed");
                break;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(user_id, error = %e, "Realtime receive error");
                break;
            }
        }
    }
}

/// Dispatch a single parsed text frame to the appropriate handler.
fn handle_text_message(
    text: &str,
    user_id: DbId,
    own_session_id: &str,
    registry: &Arc<DeliveryRegistry>,
    deactivations: &mpsc::UnboundedSender<SessionDeactivated>,
) {
    match parse_message(text) {
        Ok(ChangeMessage::JobChanged(change)) => {
            handle_job_change(change, user_id, registry);
        }
        Ok(ChangeMessage::SessionChanged(change)) => {
            handle_session_change(change, own_session_id, deactivations);
        }
        Ok(ChangeMessage::Subscribed(data)) => {
            tracing::info!(user_id = data.user_id, "Subscription confirmed");
        }
        Ok(ChangeMessage::Keepalive) => {
            tracing::trace!(user_id, "Realtime keepalive");
        }
        Err(e) => {
            tracing::warn!(
                user_id,
                error = %e,
                raw_message = %text,
                "Failed to parse realtime message",
            );
        }
    }
}

/// Push a terminal job change into the registry. Non-terminal updates
/// carry no result and are ignored; the registry absorbs a duplicate if
/// the poll channel got there first.
fn handle_job_change(change: JobChange, user_id: DbId, registry: &Arc<DeliveryRegistry>) {
    if change.user_id != user_id {
        tracing::debug!(
            job_id = change.id,
            "Ignoring job change for another user",
        );
        return;
    }

    let Some(status) = JobStatus::from_id(change.status_id) else {
        tracing::warn!(
            job_id = change.id,
            status_id = change.status_id,
            "Unknown status in job change",
        );
        return;
    };

    if let Some(outcome) = terminal_outcome(
        status,
        change.response_payload.as_ref(),
        change.error_message.as_deref(),
    ) {
        registry.deliver(change.id, outcome, DeliverySource::Push);
    } else {
        tracing::debug!(job_id = change.id, status = ?status, "Non-terminal job change");
    }
}

/// Forward an own-session deactivation to the monitor. The monitor
/// applies the active-job guard; changes for other devices' sessions are
/// noise here.
fn handle_session_change(
    change: SessionChange,
    own_session_id: &str,
    deactivations: &mpsc::UnboundedSender<SessionDeactivated>,
) {
    if change.is_active || change.session_id != own_session_id {
        tracing::trace!(
            session_id = change.session_id,
            is_active = change.is_active,
            "Session change not relevant to this device",
        );
        return;
    }

    tracing::info!(
        session_id = change.session_id,
        "Own session deactivated remotely",
    );
    let _ = deactivations.send(SessionDeactivated {
        session_id: change.session_id,
    });
}
