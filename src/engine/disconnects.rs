use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::game::GameId;

/// Tracks disconnected participants of active games.
///
/// The sweeper snapshots expired entries under the read lock and acts on
/// them outside it, so forfeit processing never holds the tracker across
/// store or broadcast I/O.
pub struct DisconnectTracker {
    inner: RwLock<HashMap<GameId, HashMap<String, Instant>>>,
}

impl DisconnectTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Record a disconnection. Re-disconnecting refreshes the window.
    pub async fn mark(&self, game_id: GameId, handle: &str) {
        let mut inner = self.inner.write().await;
        inner
            .entry(game_id)
            .or_default()
            .insert(handle.to_string(), Instant::now());
    }

    /// Clear a disconnection on reconnect. Returns whether an entry existed;
    /// `false` means the window already expired (or never started) and the
    /// call is a no-op.
    pub async fn clear(&self, game_id: &GameId, handle: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(handles) = inner.get_mut(game_id) else {
            return false;
        };
        let removed = handles.remove(handle).is_some();
        if handles.is_empty() {
            inner.remove(game_id);
        }
        removed
    }

    pub async fn is_tracked(&self, game_id: &GameId, handle: &str) -> bool {
        self.inner
            .read()
            .await
            .get(game_id)
            .is_some_and(|handles| handles.contains_key(handle))
    }

    /// Snapshot of entries disconnected for longer than `timeout`.
    pub async fn expired(&self, timeout: Duration) -> Vec<(GameId, String)> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner
            .iter()
            .flat_map(|(game_id, handles)| {
                handles.iter().filter_map(move |(handle, since)| {
                    if now.duration_since(*since) >= timeout {
                        Some((*game_id, handle.clone()))
                    } else {
                        None
                    }
                })
            })
            .collect()
    }

    /// Drop all entries for a game (it completed or was abandoned).
    pub async fn remove_game(&self, game_id: &GameId) {
        self.inner.write().await.remove(game_id);
    }

    /// Keep only entries whose game id passes the filter.
    pub async fn retain_games<F: FnMut(&GameId) -> bool>(&self, mut keep: F) {
        self.inner.write().await.retain(|game_id, _| keep(game_id));
    }

    pub async fn tracked_games(&self) -> Vec<GameId> {
        self.inner.read().await.keys().copied().collect()
    }
}

impl Default for DisconnectTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn clear_before_expiry_is_observed() {
        let tracker = DisconnectTracker::new();
        let game_id = Uuid::new_v4();

        tracker.mark(game_id, "alice").await;
        assert!(tracker.is_tracked(&game_id, "alice").await);

        assert!(tracker.clear(&game_id, "alice").await);
        assert!(!tracker.is_tracked(&game_id, "alice").await);
        // Second clear is a no-op
        assert!(!tracker.clear(&game_id, "alice").await);
    }

    #[tokio::test]
    async fn expiry_respects_timeout() {
        let tracker = DisconnectTracker::new();
        let game_id = Uuid::new_v4();
        tracker.mark(game_id, "alice").await;

        assert!(tracker.expired(Duration::from_secs(60)).await.is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let expired = tracker.expired(Duration::from_millis(10)).await;
        assert_eq!(expired, vec![(game_id, "alice".to_string())]);
    }

    #[tokio::test]
    async fn retain_games_drops_finished_entries() {
        let tracker = DisconnectTracker::new();
        let live = Uuid::new_v4();
        let dead = Uuid::new_v4();
        tracker.mark(live, "alice").await;
        tracker.mark(dead, "bob").await;

        tracker.retain_games(|id| *id == live).await;
        assert!(tracker.is_tracked(&live, "alice").await);
        assert!(!tracker.is_tracked(&dead, "bob").await);
    }
}
