//! Session engine: game lifecycle, move application, custom rooms, the
//! write-through cache, disconnect tracking, and the cleanup worker.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::GameError;
use crate::events::{BackgroundPublisher, EventKind, EventSink, GameEvent};
use crate::game::{
    Color, GameEndReason, GameId, GameSession, GameStatus, MoveRecord, WAITING_PLAYER,
};
use crate::metrics::ServerMetrics;
use crate::protocol::{generate_room_code, normalize_room_code};
use crate::storage::GameStore;

pub mod bot;
mod cache;
mod cleanup;
mod disconnects;

pub use bot::{generate_bot_handle, BotStrategy, RandomBot};
use cache::SessionCache;
use disconnects::DisconnectTracker;

/// Attempts at generating a collision-free room code before giving up.
const ROOM_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Idle time after which an active session is abandoned.
    pub session_timeout: Duration,
    /// Grace window for a disconnected player before forfeit.
    pub disconnect_timeout: Duration,
    /// Cleanup worker tick.
    pub cleanup_interval: Duration,
    /// Cache entries untouched for this long are dropped.
    pub cache_max_age: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            disconnect_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(5),
            cache_max_age: Duration::from_secs(10 * 60),
        }
    }
}

/// A game the cleanup worker finished on its own (forfeit or abandonment).
/// The WebSocket layer consumes these to notify the room.
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub session: GameSession,
    pub reason: GameEndReason,
}

/// Result of an accepted move: the persisted record plus a post-move
/// snapshot of the session.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub record: MoveRecord,
    pub session: GameSession,
}

impl MoveOutcome {
    pub fn ended(&self) -> bool {
        self.session.status.is_terminal()
    }

    pub fn winner(&self) -> Option<Color> {
        self.session.winner
    }

    pub fn is_draw(&self) -> bool {
        self.ended() && self.session.winner.is_none()
    }
}

pub struct GameEngine {
    store: Arc<dyn GameStore>,
    cache: SessionCache,
    disconnects: DisconnectTracker,
    events: BackgroundPublisher,
    metrics: Arc<ServerMetrics>,
    config: EngineConfig,
    completions: mpsc::UnboundedSender<CompletionNotice>,
}

impl GameEngine {
    /// Build the engine plus the receiver for cleanup-driven completions.
    pub fn new(
        store: Arc<dyn GameStore>,
        events: Arc<dyn EventSink>,
        metrics: Arc<ServerMetrics>,
        config: EngineConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<CompletionNotice>) {
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            store,
            cache: SessionCache::new(),
            disconnects: DisconnectTracker::new(),
            events: BackgroundPublisher::spawn(events),
            metrics,
            config,
            completions,
        });
        (engine, completions_rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a PvP session. Red is `player1` and moves first.
    pub async fn create_session(
        &self,
        player1: &str,
        player2: &str,
    ) -> Result<GameSession, GameError> {
        if player1.is_empty() || player2.is_empty() {
            return Err(GameError::EmptyHandle);
        }
        if player1 == player2 {
            return Err(GameError::DuplicateHandles(player1.to_string()));
        }

        let session = GameSession::new_pvp(player1.to_string(), player2.to_string());
        self.store
            .create_session(&session)
            .await
            .map_err(GameError::Storage)?;
        self.cache.insert(session.clone()).await;
        self.metrics.increment_games_started();

        self.emit(
            GameEvent::new(EventKind::GameStarted, session.id, player1)
                .with_metadata("player1", player1)
                .with_metadata("player2", player2),
        );
        info!(game_id = %session.id, player1, player2, "Game session created");
        Ok(session)
    }

    /// Create a private room: Waiting status, sentinel second player, and a
    /// fresh 8-character code (retried on collision).
    pub async fn create_custom_room(
        &self,
        creator: &str,
    ) -> Result<(GameSession, String), GameError> {
        if creator.is_empty() {
            return Err(GameError::EmptyHandle);
        }

        for attempt in 1..=ROOM_CODE_ATTEMPTS {
            let code = generate_room_code();
            let taken = self
                .store
                .get_session_by_room_code(&code)
                .await
                .map_err(GameError::Storage)?
                .is_some();
            if taken {
                debug!(attempt, "Room code collision, regenerating");
                continue;
            }

            let session = GameSession::new_custom(creator.to_string(), code.clone());
            self.store
                .create_session(&session)
                .await
                .map_err(GameError::Storage)?;
            self.cache.insert(session.clone()).await;
            info!(game_id = %session.id, creator, %code, "Custom room created");
            return Ok((session, code));
        }

        Err(GameError::RoomCodeExhausted {
            attempts: ROOM_CODE_ATTEMPTS,
        })
    }

    /// Join a private room by code. The room must still be waiting and the
    /// joiner must not be its creator.
    pub async fn join_custom_room(
        &self,
        code: &str,
        handle: &str,
    ) -> Result<GameSession, GameError> {
        if handle.is_empty() {
            return Err(GameError::EmptyHandle);
        }
        let code = normalize_room_code(code);

        let stored = self
            .store
            .get_session_by_room_code(&code)
            .await
            .map_err(GameError::Storage)?
            .ok_or_else(|| GameError::RoomNotFound(code.clone()))?;

        let guard = self.resolve_guard(&stored.id).await?;
        let mut session = guard.lock().await;
        match session.status {
            GameStatus::Waiting => {}
            GameStatus::InProgress => return Err(GameError::RoomFull(code)),
            GameStatus::Completed | GameStatus::Abandoned => {
                return Err(GameError::RoomClosed(code))
            }
        }
        if session.player1 == handle {
            return Err(GameError::SelfJoin(code));
        }

        session.player2 = handle.to_string();
        session.status = GameStatus::InProgress;
        // The game clock starts when play becomes possible
        session.started_at = Utc::now();
        session.last_activity = session.started_at;

        self.persist(&session).await?;
        self.emit(GameEvent::new(EventKind::PlayerJoined, session.id, handle));
        self.emit(
            GameEvent::new(EventKind::GameStarted, session.id, session.player1.as_str())
                .with_metadata("player1", session.player1.as_str())
                .with_metadata("player2", session.player2.as_str())
                .with_metadata("roomCode", code.as_str()),
        );
        let snapshot = session.clone();
        drop(session);

        self.metrics.increment_games_started();
        info!(game_id = %snapshot.id, handle, %code, "Player joined custom room");
        Ok(snapshot)
    }

    /// Apply a move for `actor`. Validates turn and legality, applies the
    /// drop, checks win before draw, switches the turn, persists, and emits
    /// events. Concurrent calls for one game serialize on the session guard.
    pub async fn apply_move(
        &self,
        game_id: GameId,
        actor: &str,
        column: usize,
    ) -> Result<MoveOutcome, GameError> {
        let guard = self.resolve_guard(&game_id).await?;
        let mut session = guard.lock().await;

        if !session.status.is_active() {
            return Err(GameError::GameNotActive(game_id));
        }
        let Some(color) = session.color_of(actor) else {
            return Err(GameError::PlayerNotInGame {
                game_id,
                handle: actor.to_string(),
            });
        };
        if color != session.current_turn {
            return Err(GameError::WrongTurn {
                game_id,
                handle: actor.to_string(),
            });
        }

        let row = session
            .board
            .drop_piece(column, color)
            .map_err(|_| GameError::IllegalMove { column })?;

        session.move_count += 1;
        session.last_activity = Utc::now();
        let record = MoveRecord {
            id: Uuid::new_v4(),
            game_id,
            player: actor.to_string(),
            color,
            column,
            row,
            move_number: session.move_count,
            played_at: session.last_activity,
        };

        // Win before draw: the 42nd move can still connect four
        let won = session.board.detect_win(row, column, color);
        if won {
            session.winner = Some(color);
            session.status = GameStatus::Completed;
            session.ended_at = Some(Utc::now());
        } else if session.board.is_full() {
            session.winner = None;
            session.status = GameStatus::Completed;
            session.ended_at = Some(Utc::now());
        } else {
            session.current_turn = color.opponent();
        }

        self.persist(&session).await?;
        if let Err(err) = self.store.record_move(&record).await {
            warn!(game_id = %game_id, error = %err, "Failed to persist move record");
        }
        self.metrics.increment_moves_applied();

        // Emitting while the guard is held keeps this session's events in
        // move order even when tasks race on separate threads; enqueueing
        // is synchronous, the actual publish runs elsewhere
        self.emit(
            GameEvent::new(EventKind::MoveMade, game_id, actor)
                .with_metadata("column", column.to_string())
                .with_metadata("row", row.to_string())
                .with_metadata("moveNumber", record.move_number.to_string()),
        );
        let terminal_reason = if session.status.is_terminal() {
            let reason = if won {
                GameEndReason::ConnectFour
            } else {
                GameEndReason::Draw
            };
            self.emit_completed(&session, reason);
            Some(reason)
        } else {
            None
        };

        let snapshot = session.clone();
        drop(session);

        if let Some(reason) = terminal_reason {
            self.finalize_completed(&snapshot, reason).await;
        }

        Ok(MoveOutcome {
            record,
            session: snapshot,
        })
    }

    /// Complete a game out-of-band (voluntary forfeit, disconnect timeout,
    /// draw adjudication). Idempotent: completing a finished game returns
    /// its current snapshot.
    pub async fn complete_game(
        &self,
        game_id: GameId,
        winner: Option<Color>,
        reason: GameEndReason,
    ) -> Result<GameSession, GameError> {
        let guard = self.resolve_guard(&game_id).await?;
        let mut session = guard.lock().await;

        if session.status.is_terminal() {
            return Ok(session.clone());
        }

        session.winner = winner;
        session.status = GameStatus::Completed;
        session.ended_at = Some(Utc::now());
        session.last_activity = session.ended_at.unwrap_or_else(Utc::now);

        self.persist(&session).await?;
        self.emit_completed(&session, reason);
        let snapshot = session.clone();
        drop(session);

        self.finalize_completed(&snapshot, reason).await;
        Ok(snapshot)
    }

    /// Record that a participant of an active game dropped its connection.
    pub async fn mark_disconnected(&self, game_id: GameId, handle: &str) -> Result<(), GameError> {
        let guard = self.resolve_guard(&game_id).await?;
        let session = guard.lock().await;
        if !session.status.is_active() {
            return Err(GameError::GameNotActive(game_id));
        }
        if !session.is_participant(handle) {
            return Err(GameError::PlayerNotInGame {
                game_id,
                handle: handle.to_string(),
            });
        }
        self.disconnects.mark(game_id, handle).await;
        self.emit(
            GameEvent::new(EventKind::PlayerLeft, game_id, handle)
                .with_metadata("reason", "disconnect"),
        );
        drop(session);

        info!(game_id = %game_id, handle, "Player disconnected, forfeit window started");
        Ok(())
    }

    /// Clear a disconnection within the grace window. Returns the current
    /// session snapshot; clearing after the window expired is a no-op (the
    /// forfeit stands).
    pub async fn mark_reconnected(
        &self,
        game_id: GameId,
        handle: &str,
    ) -> Result<GameSession, GameError> {
        let guard = self.resolve_guard(&game_id).await?;
        let session = guard.lock().await;
        if !session.is_participant(handle) {
            return Err(GameError::PlayerNotInGame {
                game_id,
                handle: handle.to_string(),
            });
        }
        if self.disconnects.clear(&game_id, handle).await {
            self.emit(GameEvent::new(EventKind::PlayerReconnected, game_id, handle));
            info!(game_id = %game_id, handle, "Player reconnected within the window");
        }
        let snapshot = session.clone();
        drop(session);
        Ok(snapshot)
    }

    /// Fetch a session, cache-first.
    pub async fn get_session(&self, game_id: &GameId) -> Result<Option<GameSession>, GameError> {
        if let Some(guard) = self.cache.get(game_id).await {
            return Ok(Some(guard.lock().await.clone()));
        }
        let stored = self
            .store
            .get_session(game_id)
            .await
            .map_err(GameError::Storage)?;
        if let Some(session) = &stored {
            if !session.status.is_terminal() {
                self.cache.insert(session.clone()).await;
            }
        }
        Ok(stored)
    }

    /// The waiting or in-progress session `handle` is part of, if any.
    pub async fn active_session_for(
        &self,
        handle: &str,
    ) -> Result<Option<GameSession>, GameError> {
        self.store
            .active_session_for(handle)
            .await
            .map_err(GameError::Storage)
    }

    /// Whether `handle` is part of any waiting or in-progress session.
    pub async fn is_in_active_session(&self, handle: &str) -> Result<bool, GameError> {
        Ok(self.active_session_for(handle).await?.is_some())
    }

    pub async fn cached_session_count(&self) -> usize {
        self.cache.len().await
    }

    pub async fn is_disconnect_tracked(&self, game_id: &GameId, handle: &str) -> bool {
        self.disconnects.is_tracked(game_id, handle).await
    }

    /// Resolve the session guard, cache-first with store fallback.
    async fn resolve_guard(
        &self,
        game_id: &GameId,
    ) -> Result<Arc<Mutex<GameSession>>, GameError> {
        if let Some(guard) = self.cache.get(game_id).await {
            return Ok(guard);
        }
        let stored = self
            .store
            .get_session(game_id)
            .await
            .map_err(GameError::Storage)?
            .ok_or(GameError::GameNotFound(*game_id))?;
        if stored.status.is_terminal() {
            // Finished games are not re-cached
            return Ok(Arc::new(Mutex::new(stored)));
        }
        Ok(self.cache.insert(stored).await)
    }

    async fn persist(&self, session: &GameSession) -> Result<(), GameError> {
        // In-memory state stays authoritative; the next lookup re-reads
        self.store.update_session(session).await.map_err(|err| {
            warn!(game_id = %session.id, error = %err, "Failed to persist session");
            GameError::Storage(err)
        })
    }

    /// Enqueue the GameCompleted event. Called with the session guard held
    /// so the event cannot be reordered against the session's moves.
    fn emit_completed(&self, session: &GameSession, reason: GameEndReason) {
        let winner_meta = session
            .winner
            .map(|c| session.player_for(c).to_string())
            .unwrap_or_else(|| "draw".to_string());
        let duration_ms = (session.duration_secs() * 1000).max(0);
        let reason_str = serde_json::to_value(reason)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        self.emit(
            GameEvent::new(EventKind::GameCompleted, session.id, session.player1.as_str())
                .with_metadata("winner", winner_meta)
                .with_metadata("player1", session.player1.as_str())
                .with_metadata("player2", session.player2.as_str())
                .with_metadata("durationMs", duration_ms.to_string())
                .with_metadata("reason", reason_str),
        );
    }

    /// Post-completion bookkeeping: stats, cache and tracker eviction.
    async fn finalize_completed(&self, session: &GameSession, reason: GameEndReason) {
        self.metrics.increment_games_completed();
        self.update_stats(session).await;
        self.cache.invalidate(&session.id).await;
        self.disconnects.remove_game(&session.id).await;
        info!(
            game_id = %session.id,
            winner = ?session.winner,
            ?reason,
            duration_secs = session.duration_secs(),
            "Game completed"
        );
    }

    /// Both participants get a played game; the winner gets the win.
    async fn update_stats(&self, session: &GameSession) {
        for color in [Color::Red, Color::Yellow] {
            let handle = session.player_for(color);
            if handle == WAITING_PLAYER {
                continue;
            }
            let won = session.winner == Some(color);
            let mut stats = match self.store.get_stats(handle).await {
                Ok(Some(stats)) => stats,
                Ok(None) => crate::game::PlayerStats::new(handle.to_string()),
                Err(err) => {
                    warn!(handle, error = %err, "Failed to read player stats");
                    continue;
                }
            };
            stats.record_result(won);
            if let Err(err) = self.store.upsert_stats(&stats).await {
                warn!(handle, error = %err, "Failed to update player stats");
            }
        }
    }

    fn emit(&self, event: GameEvent) {
        self.events.enqueue(event);
    }

    fn notify_completion(&self, session: GameSession, reason: GameEndReason) {
        let _ = self.completions.send(CompletionNotice { session, reason });
    }
}
