use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use chrono::NaiveDate;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::api::AppState;
use crate::board::cache::CacheEvent;
use crate::errors::ErrorKind;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── Event types ──────────────────────────────────────────────────────

/// Pushed to every connected client. Clients reload the affected views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum DashboardEvent {
    SnapshotRefreshed {
        fetched_at_millis: i64,
        card_count: usize,
    },
    SnapshotInvalidated,
    RefreshFailed {
        kind: ErrorKind,
        message: String,
    },
    CardCreated {
        card_id: String,
        name: String,
    },
    CardUpdated {
        card_id: String,
    },
    CardArchived {
        card_id: String,
    },
    PlannedRangeChanged {
        card_id: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    ProjectCreated {
        project_id: i64,
        card_ids: Vec<String>,
    },
    MaintenanceFinished {
        task: String,
        updated: usize,
        failed: usize,
    },
}

impl From<CacheEvent> for DashboardEvent {
    fn from(event: CacheEvent) -> Self {
        match event {
            CacheEvent::Refreshed {
                fetched_at_millis,
                card_count,
            } => Self::SnapshotRefreshed {
                fetched_at_millis,
                card_count,
            },
            CacheEvent::Invalidated => Self::SnapshotInvalidated,
            CacheEvent::RefreshFailed { kind, message } => Self::RefreshFailed { kind, message },
        }
    }
}

// ── Socket handling ──────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    let rx = state.ws_tx.subscribe();
    debug!("websocket client connected");
    run_socket_loop(sender, receiver, rx).await;
    debug!("websocket client disconnected");
}

/// Forward broadcast events to one client, with ping/pong keepalive. The
/// loop ends when the client closes or misses a pong for [`PONG_TIMEOUT`].
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket client lagged");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helpers ────────────────────────────────────────────────

/// Serialize and broadcast an event to all connected clients. No-op when
/// nobody is listening.
pub fn broadcast_event(tx: &broadcast::Sender<String>, event: &DashboardEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => warn!(error = %e, "failed to serialize dashboard event"),
    }
}

/// Relay cache events to websocket clients until the cache is dropped.
pub fn spawn_cache_forwarder(
    mut events: broadcast::Receiver<CacheEvent>,
    tx: broadcast::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => broadcast_event(&tx, &DashboardEvent::from(event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "cache event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
