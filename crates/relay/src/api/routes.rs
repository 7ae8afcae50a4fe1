//! WebSocket handlers for producer and consumer connections.
//!
//! Only `/upload` and `/download` upgrade; every other path 404s at the
//! router and is never upgraded.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use shared::{ConsumerMessage, ProducerMessage};

use crate::api::AppState;
use crate::relay::CONSUMER_QUEUE_DEPTH;

pub async fn upload_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_producer(socket, state))
}

pub async fn download_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_consumer(socket, state))
}

/// Producer loop: decode each text frame once at the boundary, store frame
/// payloads, drop everything else. Close and transport errors both end the
/// loop, so the disconnect bookkeeping below runs exactly once.
async fn handle_producer(mut socket: WebSocket, state: AppState) {
    state.relay.producer_connected();
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ProducerMessage>(&text) {
                Ok(ProducerMessage::Frame { data: Some(data) }) => state.relay.store_frame(data),
                Ok(_) => {}
                Err(e) => tracing::debug!("discarding malformed producer message: {}", e),
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::warn!("producer socket error: {}", e);
                break;
            }
            _ => {}
        }
    }
    state.relay.producer_disconnected();
}

/// Consumer loop: register an outbound queue with the relay, then decode
/// pull requests. A single writer task owns the sink, so writes to this
/// connection are never interleaved.
async fn handle_consumer(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(CONSUMER_QUEUE_DEPTH);
    let id = state.relay.consumer_connected(tx);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ConsumerMessage>(&text) {
                Ok(ConsumerMessage::GetFrame) => state.relay.frame_request(id),
                Ok(ConsumerMessage::Unrecognized(_)) => {}
                Err(e) => tracing::debug!("discarding malformed consumer message: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("consumer socket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Dropping the registered sender ends the writer task; abort covers a
    // writer stuck on a dead peer.
    state.relay.consumer_disconnected(id);
    writer.abort();
}
