use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::analytics::AnalyticsSnapshot;
use crate::events::GameEvent;
use crate::game::{GameId, GameSession, GameStatus, MoveRecord, PlayerStats};

use super::GameStore;

/// In-memory store for tests and single-instance deployments.
///
/// Lock ordering: `sessions` first, then `room_codes`. Both are held
/// simultaneously on the write paths so no task can observe a room-code
/// entry whose session does not exist yet.
pub struct InMemoryStore {
    sessions: RwLock<HashMap<GameId, GameSession>>,
    /// Maps normalized room code -> session id.
    room_codes: RwLock<HashMap<String, GameId>>,
    moves: RwLock<HashMap<GameId, Vec<MoveRecord>>>,
    stats: RwLock<HashMap<String, PlayerStats>>,
    events: RwLock<Vec<GameEvent>>,
    snapshots: RwLock<Vec<AnalyticsSnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            room_codes: RwLock::new(HashMap::new()),
            moves: RwLock::new(HashMap::new()),
            stats: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            snapshots: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored sessions (test helper).
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// All persisted raw events in arrival order (test helper).
    pub async fn events(&self) -> Vec<GameEvent> {
        self.events.read().await.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for InMemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn create_session(&self, session: &GameSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let mut room_codes = self.room_codes.write().await;

        if sessions.contains_key(&session.id) {
            anyhow::bail!("session {} already exists", session.id);
        }
        if let Some(code) = &session.room_code {
            if room_codes.contains_key(code) {
                anyhow::bail!("room code {code} already exists");
            }
            room_codes.insert(code.clone(), session.id);
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, game_id: &GameId) -> Result<Option<GameSession>> {
        Ok(self.sessions.read().await.get(game_id).cloned())
    }

    async fn get_session_by_room_code(&self, code: &str) -> Result<Option<GameSession>> {
        let sessions = self.sessions.read().await;
        let room_codes = self.room_codes.read().await;
        Ok(room_codes
            .get(code)
            .and_then(|id| sessions.get(id))
            .cloned())
    }

    async fn update_session(&self, session: &GameSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => anyhow::bail!("session {} does not exist", session.id),
        }
    }

    async fn active_session_for(&self, handle: &str) -> Result<Option<GameSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|s| {
                matches!(s.status, GameStatus::Waiting | GameStatus::InProgress)
                    && s.is_participant(handle)
            })
            .cloned())
    }

    async fn record_move(&self, record: &MoveRecord) -> Result<()> {
        let mut moves = self.moves.write().await;
        moves.entry(record.game_id).or_default().push(record.clone());
        Ok(())
    }

    async fn get_moves(&self, game_id: &GameId) -> Result<Vec<MoveRecord>> {
        Ok(self.moves.read().await.get(game_id).cloned().unwrap_or_default())
    }

    async fn get_stats(&self, handle: &str) -> Result<Option<PlayerStats>> {
        Ok(self.stats.read().await.get(handle).cloned())
    }

    async fn upsert_stats(&self, stats: &PlayerStats) -> Result<()> {
        self.stats
            .write()
            .await
            .insert(stats.handle.clone(), stats.clone());
        Ok(())
    }

    async fn record_event(&self, event: &GameEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn record_snapshot(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn get_snapshots(&self) -> Result<Vec<AnalyticsSnapshot>> {
        Ok(self.snapshots.read().await.clone())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_session() {
        let store = InMemoryStore::new();
        let session = GameSession::new_pvp("alice".into(), "bob".into());
        store.create_session(&session).await.unwrap();

        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.player1, "alice");
        assert!(store.create_session(&session).await.is_err());
    }

    #[tokio::test]
    async fn room_code_lookup_resolves_custom_sessions() {
        let store = InMemoryStore::new();
        let session = GameSession::new_custom("alice".into(), "AB23CD45".into());
        store.create_session(&session).await.unwrap();

        let by_code = store
            .get_session_by_room_code("AB23CD45")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.id, session.id);
        assert!(store
            .get_session_by_room_code("ZZZZZZZZ")
            .await
            .unwrap()
            .is_none());

        // A second session may not reuse a live code
        let clash = GameSession::new_custom("carol".into(), "AB23CD45".into());
        assert!(store.create_session(&clash).await.is_err());
    }

    #[tokio::test]
    async fn active_session_lookup_ignores_finished_games() {
        let store = InMemoryStore::new();
        let mut session = GameSession::new_pvp("alice".into(), "bob".into());
        store.create_session(&session).await.unwrap();

        assert!(store
            .active_session_for("alice")
            .await
            .unwrap()
            .is_some());

        session.status = GameStatus::Completed;
        store.update_session(&session).await.unwrap();
        assert!(store.active_session_for("alice").await.unwrap().is_none());
        assert!(store.active_session_for("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn moves_accumulate_in_order() {
        let store = InMemoryStore::new();
        let session = GameSession::new_pvp("alice".into(), "bob".into());
        store.create_session(&session).await.unwrap();

        for number in 1..=3u32 {
            let record = MoveRecord {
                id: uuid::Uuid::new_v4(),
                game_id: session.id,
                player: "alice".into(),
                color: crate::game::Color::Red,
                column: 0,
                row: (number - 1) as usize,
                move_number: number,
                played_at: chrono::Utc::now(),
            };
            store.record_move(&record).await.unwrap();
        }

        let moves = store.get_moves(&session.id).await.unwrap();
        assert_eq!(moves.len(), 3);
        assert!(moves.windows(2).all(|w| w[0].move_number < w[1].move_number));
    }

    #[tokio::test]
    async fn stats_upsert_replaces_row() {
        let store = InMemoryStore::new();
        let mut stats = PlayerStats::new("alice".into());
        stats.record_result(true);
        store.upsert_stats(&stats).await.unwrap();

        stats.record_result(false);
        store.upsert_stats(&stats).await.unwrap();

        let fetched = store.get_stats("alice").await.unwrap().unwrap();
        assert_eq!(fetched.games_played, 2);
        assert_eq!(fetched.games_won, 1);
    }
}
