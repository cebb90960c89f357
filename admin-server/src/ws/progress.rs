use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use backup_core::ProgressSink;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::auth::AdminUser;
use crate::state::AppState;

const BROADCAST_CAPACITY: usize = 256;
/// Finished operations are forgotten after this many milliseconds.
const FINISHED_RETENTION_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgress {
    pub operation_id: String,
    pub message: String,
    pub percent: u8,
    pub status: OperationStatus,
    pub updated_at: i64,
}

/// Latest progress per operation id, fanned out to WebSocket clients.
#[derive(Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<String>,
    operations: Arc<DashMap<String, OperationProgress>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            operations: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn get(&self, operation_id: &str) -> Option<OperationProgress> {
        self.operations.get(operation_id).map(|p| p.clone())
    }

    pub fn begin(&self, operation_id: &str, message: &str) {
        self.prune_finished();
        self.publish(operation_id, message, Some(0), OperationStatus::Running);
    }

    pub fn update(&self, operation_id: &str, message: &str, percent: u8) {
        self.publish(operation_id, message, Some(percent), OperationStatus::Running);
    }

    /// Mark the operation finished. A failure keeps the last percentage.
    pub fn finish(&self, operation_id: &str, success: bool, message: &str) {
        if success {
            self.publish(operation_id, message, Some(100), OperationStatus::Completed);
        } else {
            self.publish(operation_id, message, None, OperationStatus::Failed);
        }
    }

    /// Progress sink bound to one operation, usable from blocking threads.
    pub fn sink(&self, operation_id: &str) -> OperationSink {
        OperationSink {
            hub: self.clone(),
            operation_id: operation_id.to_string(),
        }
    }

    fn publish(&self, operation_id: &str, message: &str, percent: Option<u8>, status: OperationStatus) {
        let snapshot = {
            let mut entry = self
                .operations
                .entry(operation_id.to_string())
                .or_insert_with(|| OperationProgress {
                    operation_id: operation_id.to_string(),
                    message: String::new(),
                    percent: 0,
                    status,
                    updated_at: 0,
                });
            entry.message = message.to_string();
            if let Some(p) = percent {
                entry.percent = p.min(100);
            }
            entry.status = status;
            entry.updated_at = chrono::Utc::now().timestamp_millis();
            entry.clone()
        };

        let msg = serde_json::json!({
            "type": "backup:progress",
            "payload": snapshot,
        });
        let _ = self.tx.send(msg.to_string());
    }

    fn prune_finished(&self) {
        let cutoff = chrono::Utc::now().timestamp_millis() - FINISHED_RETENTION_MS;
        self.operations
            .retain(|_, p| p.status == OperationStatus::Running || p.updated_at > cutoff);
    }
}

pub struct OperationSink {
    hub: ProgressHub,
    operation_id: String,
}

impl ProgressSink for OperationSink {
    fn report(&self, message: &str, percent: u8) {
        self.hub.update(&self.operation_id, message, percent);
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_progress_socket(socket, state))
}

async fn handle_progress_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.progress.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(16);

    // Forward broadcasts and direct replies to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(m) => m,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(m) = reply_rx.recv() => m,
            };
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // A client that connects mid-operation asks for the current snapshot
    let hub = state.progress.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else { continue };
            let Ok(parsed) = serde_json::from_str::<Value>(&text) else { continue };
            if parsed.get("type").and_then(|t| t.as_str()) != Some("progress:request") {
                continue;
            }
            let operation_id = parsed
                .pointer("/payload/operationId")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let reply = match hub.get(operation_id) {
                Some(p) => serde_json::json!({ "type": "backup:progress", "payload": p }),
                None => serde_json::json!({
                    "type": "backup:unknown",
                    "payload": { "operationId": operation_id },
                }),
            };
            if reply_tx.send(reply.to_string()).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut recv_task => {},
        _ = state.shutdown.cancelled() => {},
    }
    send_task.abort();
    recv_task.abort();
}
