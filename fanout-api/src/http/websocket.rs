//! WebSocket signaling endpoint
//!
//! Upgrades the request and hands the socket to the SFU session lifecycle.
//! The socket is split: the sink half becomes the session's signaling
//! writer, the stream half feeds the inbound signaling loop.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use fanout_sfu::{
    accept_session, Error, PendingConnection, Role, SignalReader, SignalWriter, SignalingChannel,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::http::{AppResult, AppState};

/// Query parameters for the WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Forwarding role of the session, `participant` when absent
    #[serde(default)]
    pub role: Role,
}

/// Outbound half of the socket
struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl SignalWriter for WsWriter {
    async fn write_text(&mut self, text: String) -> fanout_sfu::Result<()> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::Signaling(format!("WebSocket send failed: {e}")))
    }

    async fn close(&mut self) -> fanout_sfu::Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| Error::Signaling(format!("WebSocket close failed: {e}")))
    }
}

/// Inbound half of the socket
struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait::async_trait]
impl SignalReader for WsReader {
    async fn recv(&mut self) -> Option<fanout_sfu::Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                Some(Ok(Message::Binary(_))) => {
                    return Some(Err(Error::Protocol(
                        "binary frames are not part of the protocol".to_string(),
                    )));
                }
                Some(Ok(Message::Close(_))) => return None, // Graceful close
                Some(Err(e)) => {
                    return Some(Err(Error::Signaling(format!("WebSocket error: {e}"))));
                }
                None => return None, // Stream ended
                Some(Ok(_)) => {
                    // Ping/pong are answered by axum
                }
            }
        }
    }
}

/// WebSocket handler for signaling
///
/// `ws://host/websocket?role=participant|broadcaster|viewer`
///
/// The peer connection is created before the upgrade; engine failures are
/// answered with an HTTP error.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let pending = state.engine.prepare().await?;

    Ok(ws
        .max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, query.role, pending)))
}

async fn handle_socket(socket: WebSocket, state: AppState, role: Role, pending: PendingConnection) {
    let (sink, stream) = socket.split();
    let channel = Arc::new(SignalingChannel::new(WsWriter { sink }));
    let mut reader = WsReader { stream };

    let session_id =
        accept_session(&state.engine, pending, &state.manager, role, channel, &mut reader).await;
    info!(session_id = %session_id, "WebSocket session ended");
}
