//! Connection hub: per-handle connection registry, per-game rooms, broadcast,
//! and the stale-connection sweep.
//!
//! One coordination loop owns both indices and serializes every mutation
//! through a command channel, so the hot path takes no global lock. Outbound
//! delivery is always `try_send` into the connection's bounded queue; a full
//! queue evicts that connection instead of stalling the room.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::GameId;
use crate::metrics::ServerMetrics;
use crate::protocol::{ServerFrame, ServerMessage};

pub mod connection;
pub mod dispatch;
pub mod notifier;
pub mod routes;

pub use connection::Connection;
pub use dispatch::MessageHandler;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-frame write deadline.
    pub write_wait: Duration,
    /// Read deadline; a silent connection is dead after this.
    pub pong_wait: Duration,
    /// Ping cadence. Must be strictly less than `pong_wait`.
    pub ping_period: Duration,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
    /// Connections unseen for this long are swept.
    pub stale_threshold: Duration,
    /// Stale sweep cadence.
    pub sweep_interval: Duration,
    /// Outbound frame queue capacity per connection.
    pub outbound_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            max_message_size: 512,
            stale_threshold: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(30),
            outbound_queue: 256,
        }
    }
}

type FrameSender = mpsc::Sender<Arc<ServerFrame>>;

struct ConnectionEntry {
    conn_id: Uuid,
    sender: FrameSender,
    room: Option<GameId>,
    last_seen: Instant,
}

enum HubCommand {
    Register {
        handle: String,
        conn_id: Uuid,
        sender: FrameSender,
    },
    Unregister {
        handle: String,
        conn_id: Uuid,
    },
    JoinRoom {
        handle: String,
        room: GameId,
    },
    LeaveRoom {
        handle: String,
    },
    Broadcast {
        room: GameId,
        frame: Arc<ServerFrame>,
        exclude: Option<String>,
    },
    SendTo {
        handle: String,
        frame: Arc<ServerFrame>,
    },
    Touch {
        handle: String,
    },
    Sweep,
    ConnectionCount {
        reply: oneshot::Sender<usize>,
    },
    RoomSize {
        room: GameId,
        reply: oneshot::Sender<usize>,
    },
}

/// Cheap-to-clone handle onto the hub's coordination loop.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    config: Arc<HubConfig>,
}

impl Hub {
    /// Spawn the coordination loop and the stale sweeper.
    pub fn spawn(
        config: HubConfig,
        metrics: Arc<ServerMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        let config = Arc::new(config);
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let state = HubState {
            connections: HashMap::new(),
            rooms: HashMap::new(),
            metrics,
            stale_threshold: config.stale_threshold,
        };
        tokio::spawn(state.run(commands_rx, cancel.clone()));

        let sweep_commands = commands.clone();
        let sweep_interval = config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if sweep_commands.send(HubCommand::Sweep).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self { commands, config }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a connection under a handle. A second registration for the
    /// same handle closes and replaces the first.
    pub fn register(&self, handle: &str, conn_id: Uuid, sender: FrameSender) {
        self.send(HubCommand::Register {
            handle: handle.to_string(),
            conn_id,
            sender,
        });
    }

    /// Remove a connection. Only removes the entry if `conn_id` still owns
    /// it, so a replaced connection's cleanup cannot evict its successor.
    pub fn unregister(&self, handle: &str, conn_id: Uuid) {
        self.send(HubCommand::Unregister {
            handle: handle.to_string(),
            conn_id,
        });
    }

    pub fn join_room(&self, handle: &str, room: GameId) {
        self.send(HubCommand::JoinRoom {
            handle: handle.to_string(),
            room,
        });
    }

    pub fn leave_room(&self, handle: &str) {
        self.send(HubCommand::LeaveRoom {
            handle: handle.to_string(),
        });
    }

    pub fn broadcast(&self, room: GameId, message: ServerMessage, exclude: Option<&str>) {
        self.send(HubCommand::Broadcast {
            room,
            frame: Arc::new(ServerFrame::new(message)),
            exclude: exclude.map(str::to_string),
        });
    }

    pub fn send_to(&self, handle: &str, message: ServerMessage) {
        self.send(HubCommand::SendTo {
            handle: handle.to_string(),
            frame: Arc::new(ServerFrame::new(message)),
        });
    }

    /// Refresh a connection's liveness timestamp.
    pub fn touch(&self, handle: &str) {
        self.send(HubCommand::Touch {
            handle: handle.to_string(),
        });
    }

    pub async fn connection_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ConnectionCount { reply });
        rx.await.unwrap_or(0)
    }

    pub async fn room_size(&self, room: GameId) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::RoomSize { room, reply });
        rx.await.unwrap_or(0)
    }

    fn send(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            debug!("Hub coordination loop has stopped, command dropped");
        }
    }
}

struct HubState {
    /// At most one connection per handle.
    connections: HashMap<String, ConnectionEntry>,
    /// Unordered membership sets; empty rooms are deleted eagerly.
    rooms: HashMap<GameId, HashSet<String>>,
    metrics: Arc<ServerMetrics>,
    stale_threshold: Duration,
}

impl HubState {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<HubCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Hub coordination loop shutting down");
                    break;
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.apply(command);
                }
            }
        }
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                handle,
                conn_id,
                sender,
            } => self.register(handle, conn_id, sender),
            HubCommand::Unregister { handle, conn_id } => self.unregister(&handle, conn_id),
            HubCommand::JoinRoom { handle, room } => self.join_room(&handle, room),
            HubCommand::LeaveRoom { handle } => self.leave_room(&handle),
            HubCommand::Broadcast {
                room,
                frame,
                exclude,
            } => self.broadcast(room, &frame, exclude.as_deref()),
            HubCommand::SendTo { handle, frame } => {
                if self.try_deliver(&handle, &frame).is_err() {
                    self.evict(&handle, "outbound queue full");
                }
            }
            HubCommand::Touch { handle } => {
                if let Some(entry) = self.connections.get_mut(&handle) {
                    entry.last_seen = Instant::now();
                }
            }
            HubCommand::Sweep => self.sweep_stale(),
            HubCommand::ConnectionCount { reply } => {
                let _ = reply.send(self.connections.len());
            }
            HubCommand::RoomSize { room, reply } => {
                let _ = reply.send(self.rooms.get(&room).map_or(0, HashSet::len));
            }
        }
    }

    fn register(&mut self, handle: String, conn_id: Uuid, sender: FrameSender) {
        if let Some(previous) = self.connections.insert(
            handle.clone(),
            ConnectionEntry {
                conn_id,
                sender,
                room: None,
                last_seen: Instant::now(),
            },
        ) {
            // Replaced connection: dropping its sender ends its writer task,
            // which closes the socket. Its room membership carries over to
            // nothing; the new connection re-attaches explicitly.
            self.detach_from_room(&handle, previous.room);
            debug!(
                handle,
                old_conn = %previous.conn_id,
                new_conn = %conn_id,
                "Replaced existing connection for handle"
            );
        } else {
            self.metrics.increment_connections();
        }
        debug!(handle, %conn_id, "Connection registered");
    }

    fn unregister(&mut self, handle: &str, conn_id: Uuid) {
        match self.connections.get(handle) {
            Some(entry) if entry.conn_id == conn_id => {}
            // Absent, or a newer connection owns this handle now
            _ => return,
        }
        if let Some(entry) = self.connections.remove(handle) {
            self.detach_from_room(handle, entry.room);
            self.metrics.decrement_active_connections();
            debug!(handle, %conn_id, "Connection unregistered");
        }
    }

    fn join_room(&mut self, handle: &str, room: GameId) {
        let Some(entry) = self.connections.get_mut(handle) else {
            warn!(handle, %room, "Cannot attach unknown connection to room");
            return;
        };
        let previous = entry.room.replace(room);
        if previous != Some(room) {
            self.detach_from_room(handle, previous);
            self.rooms.entry(room).or_default().insert(handle.to_string());
        }
    }

    fn leave_room(&mut self, handle: &str) {
        let Some(entry) = self.connections.get_mut(handle) else {
            return;
        };
        let room = entry.room.take();
        self.detach_from_room(handle, room);
    }

    fn detach_from_room(&mut self, handle: &str, room: Option<GameId>) {
        let Some(room) = room else { return };
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(handle);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }

    /// Deliver to every room member except `exclude`. Recipients whose
    /// queues are full are evicted after the pass so one slow client cannot
    /// hold up the rest of the room.
    fn broadcast(&mut self, room: GameId, frame: &Arc<ServerFrame>, exclude: Option<&str>) {
        let Some(members) = self.rooms.get(&room) else {
            return;
        };
        let recipients: Vec<String> = members
            .iter()
            .filter(|handle| Some(handle.as_str()) != exclude)
            .cloned()
            .collect();

        let mut evict = Vec::new();
        for handle in recipients {
            if self.try_deliver(&handle, frame).is_err() {
                evict.push(handle);
            }
        }
        for handle in evict {
            self.evict(&handle, "outbound queue full during broadcast");
        }
    }

    fn try_deliver(&self, handle: &str, frame: &Arc<ServerFrame>) -> Result<(), ()> {
        let Some(entry) = self.connections.get(handle) else {
            return Ok(());
        };
        match entry.sender.try_send(Arc::clone(frame)) {
            Ok(()) => {
                self.metrics.increment_frames_sent();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.increment_frames_dropped();
                Err(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.increment_frames_dropped();
                // Writer already gone; unregister will follow from its task
                Ok(())
            }
        }
    }

    fn evict(&mut self, handle: &str, reason: &str) {
        if let Some(entry) = self.connections.remove(handle) {
            warn!(handle, reason, "Evicting connection");
            self.detach_from_room(handle, entry.room);
            self.metrics.decrement_active_connections();
        }
    }

    fn sweep_stale(&mut self) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > self.stale_threshold)
            .map(|(handle, _)| handle.clone())
            .collect();

        if !stale.is_empty() {
            self.metrics.add_stale_connections_swept(stale.len() as u64);
        }
        for handle in stale {
            self.evict(&handle, "stale connection");
        }
    }
}
