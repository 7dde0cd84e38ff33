//! Relay socket
//!
//! One connection is one call. Inbound frames are decoded and queued on the
//! call's controller; a writer task drains the controller's outbound events
//! back onto the socket. Closing the socket hangs the call up.

use super::types::{parse_inbound, OutboundMessage};
use super::AppState;
use crate::runtime::{ControllerHandle, Relay, StreamEvent};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

const OUTBOUND_BUFFER: usize = 256;

pub async fn relay_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let span = tracing::info_span!("relay_connection", %connection_id);

    async move {
        tracing::info!("Relay connection opened");
        let (sender, receiver) = socket.split();
        serve_connection(receiver, sender, &state.relay).await;
        tracing::info!("Relay connection closed");
    }
    .instrument(span)
    .await;
}

/// Run one call over any frame source and sink
async fn serve_connection<R, W>(frames: R, sink: W, relay: &Relay)
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    let handle = relay.spawn_call(tx);
    let writer = tokio::spawn(write_events(rx, sink).in_current_span());

    read_frames(frames, &handle).await;
    handle.hangup().await;

    // The writer drains until the controller drops its sender
    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "Relay writer task failed");
    }
}

async fn read_frames<R>(mut frames: R, handle: &ControllerHandle)
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_inbound(&text) {
                Ok(event) => {
                    if !handle.send(event).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(raw = %text, error = %e, "Ignoring malformed relay message");
                }
            },
            Ok(Message::Close(_)) => break,
            // Binary frames are not part of the protocol; ping/pong is handled by axum
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Relay receive error");
                break;
            }
        }
    }
}

async fn write_events<W>(mut events: mpsc::Receiver<StreamEvent>, mut sink: W)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(event) = events.recv().await {
        let frame = match serde_json::to_string(&OutboundMessage::from(event)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(frame)).await {
            tracing::debug!(error = %e, "Relay socket closed while sending");
            break;
        }
    }
    let _ = sink.close().await;
}
