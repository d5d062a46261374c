use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tradelink_types::events::RelayEvent;

use crate::dispatcher::{Dispatcher, RelayScope};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one relay connection whose bearer token was verified at the HTTP
/// upgrade. The account binding lasts for the lifetime of the socket.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, account_id: Uuid) {
    let (mut sender, receiver) = socket.split();

    info!("{} connected to relay", account_id);

    // Bind before Ready so nothing published after the client sees Ready is missed
    let (conn_id, user_rx) = dispatcher.register(account_id).await;
    let broadcast_rx = match dispatcher.scope() {
        RelayScope::Global => Some(dispatcher.subscribe()),
        RelayScope::Participants => None,
    };

    if send_event(&mut sender, &RelayEvent::Ready { account_id }).await.is_ok() {
        run_connection_loop(sender, receiver, account_id, user_rx, broadcast_rx).await;
    }

    dispatcher.unregister(account_id, conn_id).await;

    info!("{} disconnected from relay", account_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    account_id: Uuid,
    mut user_rx: mpsc::UnboundedReceiver<RelayEvent>,
    mut broadcast_rx: Option<broadcast::Receiver<RelayEvent>>,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward targeted + broadcast events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = next_broadcast(&mut broadcast_rx) => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Relay broadcast receiver for {} lagged by {} events", account_id, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    // None: a newer connection for this account replaced us
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout for {} (missed {} pongs), dropping connection", account_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The relay is push-only; inbound frames only matter for liveness.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    debug!(
                        "{} sent an unsupported relay frame, ignoring: {}",
                        account_id,
                        text.as_str().chars().take(200).collect::<String>()
                    );
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// Pends forever when the connection has no broadcast subscription.
async fn next_broadcast(
    rx: &mut Option<broadcast::Receiver<RelayEvent>>,
) -> Result<RelayEvent, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &RelayEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode relay event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
