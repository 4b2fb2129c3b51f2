//! Storage abstraction for sessions, moves, stats, events, and snapshots.
//!
//! The engine and the analytics consumer depend on narrow slices of this
//! contract; the in-memory backend serves tests and single-instance
//! deployments.

use anyhow::Result;
use async_trait::async_trait;

use crate::analytics::AnalyticsSnapshot;
use crate::events::GameEvent;
use crate::game::{GameId, GameSession, MoveRecord, PlayerStats};

pub mod memory;

pub use memory::InMemoryStore;

/// Storage contract for the game server.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Initialize the backend (run migrations for relational backends).
    async fn initialize(&self) -> Result<()>;

    /// Persist a newly created session.
    async fn create_session(&self, session: &GameSession) -> Result<()>;

    /// Fetch a session by id.
    async fn get_session(&self, game_id: &GameId) -> Result<Option<GameSession>>;

    /// Fetch a session by its private-room code (already normalized).
    async fn get_session_by_room_code(&self, code: &str) -> Result<Option<GameSession>>;

    /// Write back a mutated session.
    async fn update_session(&self, session: &GameSession) -> Result<()>;

    /// Find the active (waiting or in-progress) session a handle is part of.
    async fn active_session_for(&self, handle: &str) -> Result<Option<GameSession>>;

    /// Append an accepted move.
    async fn record_move(&self, record: &MoveRecord) -> Result<()>;

    /// All moves of a session in move-number order.
    async fn get_moves(&self, game_id: &GameId) -> Result<Vec<MoveRecord>>;

    /// Fetch a player's stats row.
    async fn get_stats(&self, handle: &str) -> Result<Option<PlayerStats>>;

    /// Insert or replace a player's stats row.
    async fn upsert_stats(&self, stats: &PlayerStats) -> Result<()>;

    /// Persist a raw consumed event (analytics side).
    async fn record_event(&self, event: &GameEvent) -> Result<()>;

    /// Append an analytics snapshot. Snapshots are never updated.
    async fn record_snapshot(&self, snapshot: &AnalyticsSnapshot) -> Result<()>;

    /// All snapshots in insertion order.
    async fn get_snapshots(&self) -> Result<Vec<AnalyticsSnapshot>>;

    /// Health check.
    async fn health_check(&self) -> bool;
}

/// Capability marker traits identifying focused slices of the [`GameStore`]
/// contract. Call sites can depend on the precise bound they need while any
/// full implementation satisfies all of them via the blanket impls.
pub trait SessionStore: GameStore {}
impl<T: GameStore + ?Sized> SessionStore for T {}

pub trait StatsStore: GameStore {}
impl<T: GameStore + ?Sized> StatsStore for T {}

pub trait EventStore: GameStore {}
impl<T: GameStore + ?Sized> EventStore for T {}

/// Storage configuration — in-memory only for this build.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    #[default]
    InMemory,
}

/// Create a store instance based on configuration.
pub fn create_store(config: StoreConfig) -> std::sync::Arc<dyn GameStore> {
    match config {
        StoreConfig::InMemory => std::sync::Arc::new(InMemoryStore::new()),
    }
}
