//! WebSocket subscriptions
//!
//! Every socket is registered with the [`SubscriberRegistry`] under the id
//! taken from the URL. Outbound messages flow through a bounded channel owned
//! by the registry; a writer task drains it into the socket. When the registry
//! drops the channel (disconnect, replacement, failed delivery) the writer
//! closes the socket. A socket write that stalls past the send timeout ends
//! the connection as well.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::{sync::mpsc, time};
use tracing::{debug, error, warn};

use crate::api::AppState;
use crate::models::{ClientMessage, Coordinate, ServerMessage, SubscriberId};
use crate::registry::SubscriberRegistry;

/// GET /ws/{subscriber_id}
pub async fn subscribe(
    ws: WebSocketUpgrade,
    Path(subscriber_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let id = SubscriberId::from(subscriber_id);
    ws.on_upgrade(move |socket| handle_socket(socket, id, state))
}

async fn handle_socket(socket: WebSocket, id: SubscriberId, state: AppState) {
    let registry = Arc::clone(state.service.registry());
    let (tx, rx) = mpsc::channel::<ServerMessage>(state.channel_capacity);
    let handle = registry.connect(id.clone(), tx).await;
    let (sink, mut stream) = socket.split();

    let send_timeout = registry.send_timeout();
    let mut send_task = tokio::spawn(forward_messages(rx, sink, send_timeout));

    let reader_registry = Arc::clone(&registry);
    let reader_id = id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_client_message(&reader_registry, &reader_id, text.as_str()).await
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket error from {}: {}", reader_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.release(&handle).await;
}

/// Drain a subscriber channel into the socket
///
/// Stops when the registry drops the channel, when a write fails, or when a
/// single write does not complete within `send_timeout`.
async fn forward_messages<S>(
    mut rx: mpsc::Receiver<ServerMessage>,
    mut sink: S,
    send_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    while let Some(message) = rx.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                continue;
            }
        };
        match time::timeout(send_timeout, sink.send(Message::Text(text.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("WebSocket write failed: {}", e);
                return;
            }
            Err(_) => {
                warn!("WebSocket write stalled for {:?}, closing", send_timeout);
                return;
            }
        }
    }
    let _ = time::timeout(send_timeout, sink.close()).await;
}

/// Apply one text frame received from a subscriber
///
/// Location updates are recorded and acknowledged. Anything else is logged
/// and ignored so a misbehaving client cannot break its own subscription.
pub(crate) async fn handle_client_message(
    registry: &SubscriberRegistry,
    id: &SubscriberId,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring message from {}: {}", id, e);
            return;
        }
    };

    match message {
        ClientMessage::LocationUpdate { lat, lon } => {
            let coordinate = match Coordinate::new(lat, lon) {
                Ok(coordinate) => coordinate,
                Err(e) => {
                    debug!("Ignoring location from {}: {}", id, e);
                    return;
                }
            };
            if let Err(e) = registry.update_location(id, coordinate).await {
                warn!("Location update from {} rejected: {}", id, e);
                return;
            }
            let ack = ServerMessage::LocationAck { lat, lon };
            if let Err(e) = registry.send_to(id, ack).await {
                debug!("Could not acknowledge location of {}: {}", id, e);
            }
        }
    }
}
