use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::game::{GameId, GameSession};

struct CacheEntry {
    session: Arc<Mutex<GameSession>>,
    #[allow(dead_code)]
    cached_at: Instant,
    last_access: Instant,
}

/// Write-through cache over the session store.
///
/// Each entry wraps the session in its own mutex: that guard is the
/// single-writer serialization point for concurrent moves on one game. The
/// outer map lock is only ever held for map bookkeeping, never across the
/// per-session guard or any I/O.
pub struct SessionCache {
    entries: RwLock<HashMap<GameId, CacheEntry>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cache a session (fresh from creation or a store read) and hand back
    /// its guard. If another task cached it first, that entry wins so both
    /// callers serialize on the same mutex.
    pub async fn insert(&self, session: GameSession) -> Arc<Mutex<GameSession>> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let entry = entries.entry(session.id).or_insert_with(|| CacheEntry {
            session: Arc::new(Mutex::new(session)),
            cached_at: now,
            last_access: now,
        });
        entry.last_access = now;
        Arc::clone(&entry.session)
    }

    pub async fn get(&self, game_id: &GameId) -> Option<Arc<Mutex<GameSession>>> {
        let mut entries = self.entries.write().await;
        entries.get_mut(game_id).map(|entry| {
            entry.last_access = Instant::now();
            Arc::clone(&entry.session)
        })
    }

    pub async fn invalidate(&self, game_id: &GameId) {
        self.entries.write().await.remove(game_id);
    }

    /// Drop entries whose last access predates `now - max_age`. Returns how
    /// many were removed.
    pub async fn trim_older_than(&self, max_age: Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.last_access) < max_age);
        before - entries.len()
    }

    /// Ids of all cached sessions (cleanup sweep input).
    pub async fn cached_ids(&self) -> Vec<GameId> {
        self.entries.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_same_guard_as_insert() {
        let cache = SessionCache::new();
        let session = GameSession::new_pvp("alice".into(), "bob".into());
        let id = session.id;

        let inserted = cache.insert(session).await;
        let fetched = cache.get(&id).await.unwrap();
        assert!(Arc::ptr_eq(&inserted, &fetched));
    }

    #[tokio::test]
    async fn double_insert_keeps_first_guard() {
        let cache = SessionCache::new();
        let session = GameSession::new_pvp("alice".into(), "bob".into());
        let first = cache.insert(session.clone()).await;
        let second = cache.insert(session).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = SessionCache::new();
        let session = GameSession::new_pvp("alice".into(), "bob".into());
        let id = session.id;
        cache.insert(session).await;

        cache.invalidate(&id).await;
        assert!(cache.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn trim_drops_only_stale_entries() {
        let cache = SessionCache::new();
        let stale = GameSession::new_pvp("alice".into(), "bob".into());
        let stale_id = stale.id;
        cache.insert(stale).await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = GameSession::new_pvp("carol".into(), "dave".into());
        let fresh_id = fresh.id;
        cache.insert(fresh).await;

        let removed = cache.trim_older_than(Duration::from_millis(20)).await;
        assert_eq!(removed, 1);
        assert!(cache.get(&stale_id).await.is_none());
        assert!(cache.get(&fresh_id).await.is_some());
    }
}
