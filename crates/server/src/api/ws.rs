//! WebSocket support for live job updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use jpegstamp_core::{JobEvent, JobStatus};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket message sent to clients for real-time updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// New jobs were added to the session.
    JobsAdded { job_ids: Vec<String> },
    /// A job changed status.
    JobUpdate { job_id: String, status: JobStatus },
    /// The session was cleared; all job ids are gone.
    SessionCleared { run_id: u64 },
    /// Settings, preset, delivery or pickup changed.
    SettingsChanged { run_id: u64, settings_rev: u64 },
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::JobsAdded { .. } => "jobs_added",
            WsMessage::JobUpdate { .. } => "job_update",
            WsMessage::SessionCleared { .. } => "session_cleared",
            WsMessage::SettingsChanged { .. } => "settings_changed",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

impl From<JobEvent> for WsMessage {
    fn from(event: JobEvent) -> Self {
        match event {
            JobEvent::JobsAdded { ids } => WsMessage::JobsAdded { job_ids: ids },
            JobEvent::JobUpdated { id, status } => WsMessage::JobUpdate { job_id: id, status },
            JobEvent::SessionCleared { run_id } => WsMessage::SessionCleared { run_id },
            JobEvent::SettingsChanged { generation } => WsMessage::SettingsChanged {
                run_id: generation.run_id,
                settings_rev: generation.settings_rev,
            },
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.sender.send(msg);
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Relays store events to WebSocket clients until the store goes away.
pub fn forward_job_events(
    mut events: broadcast::Receiver<JobEvent>,
    broadcaster: WsBroadcaster,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => broadcaster.broadcast(WsMessage::from(event)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Job event forwarder lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Job event forwarder stopped");
    })
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        loop {
            let msg = tokio::select! {
                result = rx.recv() => match result {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged, skipped {} messages", n);
                        WS_LAG_EVENTS.inc();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                },
            };

            WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize WsMessage: {}", e);
                }
            }
        }
    });

    // Clients only ever close or ping.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpegstamp_core::Generation;

    #[test]
    fn test_job_events_map_to_messages() {
        let msg = WsMessage::from(JobEvent::SettingsChanged {
            generation: Generation {
                run_id: 2,
                settings_rev: 5,
            },
        });
        assert_eq!(
            msg,
            WsMessage::SettingsChanged {
                run_id: 2,
                settings_rev: 5
            }
        );

        let json = serde_json::to_value(WsMessage::from(JobEvent::JobUpdated {
            id: "job-1".to_string(),
            status: JobStatus::Warning,
        }))
        .unwrap();
        assert_eq!(json["type"], "job_update");
        assert_eq!(json["status"], "warning");
    }

    #[tokio::test]
    async fn test_forwarder_relays_events() {
        let (tx, rx) = broadcast::channel(8);
        let broadcaster = WsBroadcaster::default();
        let mut client = broadcaster.subscribe();
        let handle = forward_job_events(rx, broadcaster);

        tx.send(JobEvent::SessionCleared { run_id: 3 }).unwrap();
        assert_eq!(
            client.recv().await.unwrap(),
            WsMessage::SessionCleared { run_id: 3 }
        );

        drop(tx);
        handle.await.unwrap();
    }
}
