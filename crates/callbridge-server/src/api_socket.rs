//! Audio WebSocket endpoint.
//!
//! The provider connects here after the answer webhook and streams call
//! audio as binary frames. Response audio goes back the same way.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, Query, WebSocketUpgrade,
    },
    response::Response,
};
use callbridge_calls::SocketHandle;
use futures_util::{future, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Outbound frames buffered per socket before the bridge blocks.
const OUTBOUND_BUFFER: usize = 256;

/// How long the writer gets to flush after the bridge stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub call: Option<String>,
}

/// Handler for `GET /socket?call=<id>`.
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<SocketQuery>,
) -> Result<Response, ApiError> {
    let call_key = query
        .call
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing call parameter".to_string()))?;

    let Some(session) = state.registry.get(&call_key) else {
        tracing::warn!(call = %call_key, "socket requested for unknown call");
        return Err(ApiError::NotFound(format!("call session not found: {}", call_key)));
    };
    if session.state().is_ending() {
        return Err(ApiError::Conflict(format!(
            "call {} is {}",
            session.id(),
            session.state()
        )));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, call_key)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, call_key: String) {
    let (mut sender, receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_BUFFER);
    let handle = SocketHandle::new(tx);
    let socket_id = handle.id();

    let session = match state.router.socket_opened(&call_key, handle) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(call = %call_key, "closing audio socket: {}", e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let call_id = session.id().to_string();

    // The session owns the sending half. The writer ends when the session
    // releases it, which is also what closes the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Binary(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let log_id = call_id.clone();
    let inbound = receiver
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(move |msg| {
            let frame = match msg {
                Ok(Message::Binary(bytes)) => Some(bytes.to_vec()),
                Ok(Message::Text(text)) => {
                    tracing::debug!(call_id = %log_id, text = %text.as_str(), "text frame on audio socket");
                    None
                }
                _ => None,
            };
            future::ready(frame)
        })
        .boxed();

    state.bridge.run(session, socket_id, inbound).await;

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        tracing::warn!(call_id = %call_id, "audio socket writer did not drain, aborting");
        send_task.abort();
    }
}
