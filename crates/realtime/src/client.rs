//! WebSocket client for the change-notification stream.
//!
//! [`RealtimeClient`] holds the connection configuration for one user's
//! subscription. Call [`RealtimeClient::connect`] to establish a live
//! [`RealtimeConnection`]; the subscribe frame is sent as part of the
//! handshake so a connection is always filtered from its first frame.

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use quantdesk_core::types::DbId;

use crate::messages::SubscribeRequest;

/// Configuration handle for the realtime stream.
pub struct RealtimeClient {
    user_id: DbId,
    ws_url: String,
}

/// A live, subscribed WebSocket connection.
pub struct RealtimeConnection {
    /// Unique client ID sent during the handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl RealtimeClient {
    /// Create a new client subscribing on behalf of one user.
    ///
    /// * `user_id` - the user whose job/session rows to watch.
    /// * `ws_url`  - WebSocket base URL, e.g. `ws://host:8701`.
    pub fn new(user_id: DbId, ws_url: String) -> Self {
        Self { user_id, ws_url }
    }

    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    /// Connect and subscribe.
    ///
    /// Generates a unique `client_id` (UUID v4), appends it as a query
    /// parameter, and sends the subscribe frame before returning, so the
    /// caller only ever sees a filtered stream.
    pub async fn connect(&self) -> Result<RealtimeConnection, RealtimeClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/stream?client_id={}", self.ws_url, client_id);

        let (mut ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            RealtimeClientError::Connection(format!(
                "Failed to connect to realtime stream at {}: {e}",
                self.ws_url
            ))
        })?;

        let frame = SubscribeRequest {
            user_id: self.user_id,
        }
        .to_frame();
        ws_stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| RealtimeClientError::Protocol(format!("Failed to subscribe: {e}")))?;

        tracing::info!(
            user_id = self.user_id,
            client_id = %client_id,
            "Subscribed to realtime stream at {}",
            self.ws_url,
        );

        Ok(RealtimeConnection {
            client_id,
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
