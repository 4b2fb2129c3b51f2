//! FIFO matchmaking with a bounded wait before bot fallback.
//!
//! The queue pairs strictly in arrival order; an entry that waits past
//! `match_timeout` gets a bot session instead. Outcomes are delivered over a
//! channel so the WebSocket layer can notify players and attach connections
//! without the matchmaker knowing anything about transports.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{generate_bot_handle, GameEngine};
use crate::errors::GameError;
use crate::game::GameSession;
use crate::metrics::ServerMetrics;

#[derive(Debug, Clone)]
pub struct MatchmakingConfig {
    /// How long a player waits before a bot session is created.
    pub match_timeout: Duration,
    /// Pairing pass tick.
    pub match_interval: Duration,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            match_timeout: Duration::from_secs(10),
            match_interval: Duration::from_secs(1),
        }
    }
}

/// A resolved queue entry, delivered to the WebSocket layer.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Paired { session: GameSession },
    BotFallback { session: GameSession },
}

impl MatchOutcome {
    pub fn session(&self) -> &GameSession {
        match self {
            Self::Paired { session } | Self::BotFallback { session } => session,
        }
    }
}

/// Queue membership snapshot for `queue_status` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePosition {
    /// 1-based position in arrival order.
    pub position: usize,
    /// Seconds already spent waiting.
    pub wait_secs: u64,
    /// Seconds until bot fallback.
    pub remaining_secs: u64,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    handle: String,
    joined_at: Instant,
    deadline: Instant,
}

/// Insertion-ordered entries plus a handle index. The index always agrees
/// with entry positions; both only change together under the queue mutex.
#[derive(Default)]
struct QueueState {
    entries: Vec<QueueEntry>,
    index: HashMap<String, usize>,
}

impl QueueState {
    fn contains(&self, handle: &str) -> bool {
        self.index.contains_key(handle)
    }

    fn push(&mut self, entry: QueueEntry) {
        self.index.insert(entry.handle.clone(), self.entries.len());
        self.entries.push(entry);
    }

    fn remove(&mut self, handle: &str) -> bool {
        let Some(position) = self.index.remove(handle) else {
            return false;
        };
        self.entries.remove(position);
        for entry in &self.entries[position..] {
            if let Some(slot) = self.index.get_mut(&entry.handle) {
                *slot -= 1;
            }
        }
        true
    }

    fn position(&self, handle: &str) -> Option<usize> {
        self.index.get(handle).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Plan computed by the selection phase of one tick.
enum PlannedMatch {
    Pvp(String, String),
    Bot(String),
}

pub struct Matchmaker {
    engine: Arc<GameEngine>,
    config: MatchmakingConfig,
    queue: Mutex<QueueState>,
    outcomes: mpsc::UnboundedSender<MatchOutcome>,
    metrics: Arc<ServerMetrics>,
}

impl Matchmaker {
    /// Build the matchmaker plus the receiver for match outcomes.
    pub fn new(
        engine: Arc<GameEngine>,
        config: MatchmakingConfig,
        metrics: Arc<ServerMetrics>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MatchOutcome>) {
        let (outcomes, outcomes_rx) = mpsc::unbounded_channel();
        let matchmaker = Arc::new(Self {
            engine,
            config,
            queue: Mutex::new(QueueState::default()),
            outcomes,
            metrics,
        });
        (matchmaker, outcomes_rx)
    }

    /// Enter the queue. Idempotent for an already-queued handle; rejected
    /// when the handle is empty or already playing.
    pub async fn join(&self, handle: &str) -> Result<QueuePosition, GameError> {
        if handle.is_empty() {
            return Err(GameError::EmptyHandle);
        }
        if self.engine.is_in_active_session(handle).await? {
            return Err(GameError::AlreadyInGame(handle.to_string()));
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if !queue.contains(handle) {
            let now = Instant::now();
            queue.push(QueueEntry {
                handle: handle.to_string(),
                joined_at: now,
                deadline: now + self.config.match_timeout,
            });
            self.metrics.increment_queue_joins();
            debug!(handle, depth = queue.len(), "Player joined matchmaking queue");
        }
        Ok(self.position_locked(&queue, handle).expect("entry just ensured"))
    }

    /// Leave the queue. Absence is not an error.
    pub fn leave(&self, handle: &str) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let removed = queue.remove(handle);
        if removed {
            debug!(handle, "Player left matchmaking queue");
        }
        removed
    }

    /// Current membership snapshot, if queued.
    pub fn status(&self, handle: &str) -> Option<QueuePosition> {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        self.position_locked(&queue, handle)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn position_locked(&self, queue: &QueueState, handle: &str) -> Option<QueuePosition> {
        let position = queue.position(handle)?;
        let entry = &queue.entries[position];
        let now = Instant::now();
        Some(QueuePosition {
            position: position + 1,
            wait_secs: now.duration_since(entry.joined_at).as_secs(),
            remaining_secs: entry.deadline.saturating_duration_since(now).as_secs(),
        })
    }

    /// Ticker loop: one pairing pass every `match_interval`.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.match_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Matchmaker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One pairing pass, oldest to newest, in two phases: select matches
    /// under the lock, then apply (dequeue + session creation) so no index
    /// is read after its entry was removed and no I/O runs under the lock.
    pub async fn tick(&self) {
        let now = Instant::now();

        let planned = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            let mut planned = Vec::new();
            let mut pending: Option<&QueueEntry> = None;

            for entry in &queue.entries {
                if now > entry.deadline {
                    planned.push(PlannedMatch::Bot(entry.handle.clone()));
                } else if let Some(partner) = pending.take() {
                    planned.push(PlannedMatch::Pvp(
                        partner.handle.clone(),
                        entry.handle.clone(),
                    ));
                } else {
                    pending = Some(entry);
                }
            }

            for plan in &planned {
                match plan {
                    PlannedMatch::Pvp(p1, p2) => {
                        queue.remove(p1);
                        queue.remove(p2);
                    }
                    PlannedMatch::Bot(p) => {
                        queue.remove(p);
                    }
                }
            }
            planned
        };

        for plan in planned {
            match plan {
                PlannedMatch::Pvp(p1, p2) => match self.engine.create_session(&p1, &p2).await {
                    Ok(session) => {
                        self.metrics.increment_matches_paired();
                        info!(game_id = %session.id, %p1, %p2, "Matched players");
                        let _ = self.outcomes.send(MatchOutcome::Paired { session });
                    }
                    Err(err) => {
                        warn!(%p1, %p2, error = %err, "Failed to create matched session");
                    }
                },
                PlannedMatch::Bot(player) => {
                    let bot = generate_bot_handle();
                    match self.engine.create_session(&player, &bot).await {
                        Ok(session) => {
                            self.metrics.increment_bot_fallbacks();
                            info!(game_id = %session.id, %player, %bot, "Bot fallback session created");
                            let _ = self.outcomes.send(MatchOutcome::BotFallback { session });
                        }
                        Err(err) => {
                            warn!(%player, error = %err, "Failed to create bot session");
                        }
                    }
                }
            }
        }
    }
}
