use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::GameId;
use crate::protocol::{ClientFrame, ErrorCode, ServerFrame, ServerMessage};

use super::routes::AppState;
use super::HubConfig;

/// Per-socket state shared by the reader, the writer, and the dispatcher.
///
/// A connection starts anonymous; the first control frame carrying a
/// username claims the handle, and the handle never changes afterwards.
pub struct Connection {
    pub id: Uuid,
    username: StdRwLock<Option<String>>,
    game: StdRwLock<Option<GameId>>,
    sender: mpsc::Sender<Arc<ServerFrame>>,
}

impl Connection {
    pub fn new(sender: mpsc::Sender<Arc<ServerFrame>>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            username: StdRwLock::new(None),
            game: StdRwLock::new(None),
            sender,
        })
    }

    pub fn username(&self) -> Option<String> {
        self.username
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Bind the handle. Rebinding to the same name is a no-op; a different
    /// name is rejected, a connection is renamed at most once.
    pub fn claim_username(&self, name: &str) -> Result<(), ErrorCode> {
        let mut username = self.username.write().unwrap_or_else(|e| e.into_inner());
        match username.as_deref() {
            None => {
                *username = Some(name.to_string());
                Ok(())
            }
            Some(current) if current == name => Ok(()),
            Some(_) => Err(ErrorCode::InvalidInput),
        }
    }

    pub fn game(&self) -> Option<GameId> {
        *self.game.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_game(&self, game_id: GameId) {
        *self.game.write().unwrap_or_else(|e| e.into_inner()) = Some(game_id);
    }

    pub fn clear_game(&self) {
        *self.game.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Queue a frame for this connection only. Overflow drops the frame;
    /// room-level overflow handling lives in the hub.
    pub fn send(&self, message: ServerMessage) {
        let frame = Arc::new(ServerFrame::new(message));
        if self.sender.try_send(frame).is_err() {
            debug!(conn_id = %self.id, "Dropped direct frame, outbound queue unavailable");
        }
    }

    pub fn frame_sender(&self) -> mpsc::Sender<Arc<ServerFrame>> {
        self.sender.clone()
    }
}

/// Drive one WebSocket: spawn the writer and reader halves, wait for either
/// to finish, then run disconnect cleanup exactly once.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let config = state.hub.config().clone();
    let (ws_sink, ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel::<Arc<ServerFrame>>(config.outbound_queue);
    let conn = Connection::new(tx);

    info!(conn_id = %conn.id, "WebSocket connection established");

    let write_task = tokio::spawn(write_loop(ws_sink, rx, config.clone()));
    let read_task = tokio::spawn(read_loop(ws_stream, Arc::clone(&conn), state.clone()));

    tokio::select! {
        _ = write_task => {
            debug!(conn_id = %conn.id, "Writer finished first");
        }
        _ = read_task => {
            debug!(conn_id = %conn.id, "Reader finished first");
        }
    }

    if let Some(username) = conn.username() {
        state.hub.unregister(&username, conn.id);
        state.handler.handle_disconnect(&conn).await;
    }
    info!(conn_id = %conn.id, "WebSocket connection closed");
}

/// Writer half: drains the outbound queue and pings on `ping_period`. Every
/// frame goes out as its own text message under its own `write_wait`
/// deadline; frames are never concatenated.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<ServerFrame>>,
    config: HubConfig,
) {
    let mut ping = tokio::time::interval(config.ping_period);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    // Hub dropped the sender: evicted or shutting down
                    break;
                };
                let json = match serde_json::to_string(&*frame) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(error = %err, "Failed to encode outbound frame");
                        continue;
                    }
                };
                match timeout(config.write_wait, sink.send(Message::Text(json.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(error = %err, "Write failed, closing connection");
                        break;
                    }
                    Err(_) => {
                        debug!("Write deadline expired, closing connection");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                match timeout(config.write_wait, sink.send(Message::Ping(Vec::new().into()))).await {
                    Ok(Ok(())) => {}
                    _ => {
                        debug!("Ping write failed, closing connection");
                        break;
                    }
                }
            }
        }
    }

    let _ = sink.close().await;
}

/// Reader half: enforces the `pong_wait` read deadline and the frame size
/// limit, decodes frames, and forwards them to the dispatcher. Parse
/// failures are answered with an error frame and do not kill the connection.
async fn read_loop(mut stream: SplitStream<WebSocket>, conn: Arc<Connection>, state: AppState) {
    let config = state.hub.config().clone();

    loop {
        let next = match timeout(config.pong_wait, stream.next()).await {
            Err(_) => {
                debug!(conn_id = %conn.id, "Read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                debug!(conn_id = %conn.id, error = %err, "WebSocket read error");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match next {
            Message::Text(text) => {
                if text.len() > config.max_message_size {
                    warn!(
                        conn_id = %conn.id,
                        size = text.len(),
                        max = config.max_message_size,
                        "Rejected oversized frame"
                    );
                    conn.send(ServerMessage::error(ErrorCode::MessageTooLarge));
                    continue;
                }
                state.metrics.increment_frames_received();

                let frame: ClientFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(conn_id = %conn.id, error = %err, "Undecodable client frame");
                        conn.send(ServerMessage::error_with_details(
                            ErrorCode::InvalidInput,
                            err.to_string(),
                        ));
                        continue;
                    }
                };

                if let Some(username) = conn.username() {
                    state.hub.touch(&username);
                }

                if let Err(err) = state.handler.handle(&conn, frame.message).await {
                    debug!(conn_id = %conn.id, error = %err, "Rejected client action");
                    conn.send(ServerMessage::error_with_details(err.code(), err.to_string()));
                }
            }
            Message::Pong(_) => {
                // Liveness refresh; the next read restarts the deadline
                if let Some(username) = conn.username() {
                    state.hub.touch(&username);
                }
            }
            Message::Binary(_) => {
                conn.send(ServerMessage::error_with_details(
                    ErrorCode::InvalidInput,
                    "binary frames are not supported",
                ));
            }
            Message::Ping(_) => {
                // The transport answers pings on our behalf
            }
            Message::Close(_) => {
                debug!(conn_id = %conn.id, "Client closed the connection");
                break;
            }
        }
    }
}
