use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters. All fields are atomics so any subsystem can record
/// without coordination; `snapshot()` serves the `/metrics` endpoint.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connections & frames
    active_connections: AtomicU64,
    total_connections: AtomicU64,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    stale_connections_swept: AtomicU64,

    // Games
    games_started: AtomicU64,
    games_completed: AtomicU64,
    games_abandoned: AtomicU64,
    moves_applied: AtomicU64,
    disconnect_forfeits: AtomicU64,

    // Matchmaking
    queue_joins: AtomicU64,
    matches_paired: AtomicU64,
    bot_fallbacks: AtomicU64,

    // Event producer
    events_published: AtomicU64,
    events_failed: AtomicU64,
    publish_retries: AtomicU64,
    breaker_rejections: AtomicU64,

    // Analytics consumer
    events_consumed: AtomicU64,
    consume_failures: AtomicU64,
    snapshots_flushed: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub stale_connections_swept: u64,
    pub games_started: u64,
    pub games_completed: u64,
    pub games_abandoned: u64,
    pub moves_applied: u64,
    pub disconnect_forfeits: u64,
    pub queue_joins: u64,
    pub matches_paired: u64,
    pub bot_fallbacks: u64,
    pub events_published: u64,
    pub events_failed: u64,
    pub publish_retries: u64,
    pub breaker_rejections: u64,
    pub events_consumed: u64,
    pub consume_failures: u64,
    pub snapshots_flushed: u64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        // Saturating: unregister can race a failed register
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn increment_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_frames_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_frames_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stale_connections_swept(&self, count: u64) {
        self.stale_connections_swept.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_games_started(&self) {
        self.games_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_games_completed(&self) {
        self.games_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_games_abandoned(&self) {
        self.games_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_moves_applied(&self) {
        self.moves_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_disconnect_forfeits(&self) {
        self.disconnect_forfeits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queue_joins(&self) {
        self.queue_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_matches_paired(&self) {
        self.matches_paired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bot_fallbacks(&self) {
        self.bot_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_publish_retries(&self) {
        self.publish_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_breaker_rejections(&self) {
        self.breaker_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_consumed(&self) {
        self.events_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_consume_failures(&self) {
        self.consume_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshots_flushed(&self) {
        self.snapshots_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            stale_connections_swept: self.stale_connections_swept.load(Ordering::Relaxed),
            games_started: self.games_started.load(Ordering::Relaxed),
            games_completed: self.games_completed.load(Ordering::Relaxed),
            games_abandoned: self.games_abandoned.load(Ordering::Relaxed),
            moves_applied: self.moves_applied.load(Ordering::Relaxed),
            disconnect_forfeits: self.disconnect_forfeits.load(Ordering::Relaxed),
            queue_joins: self.queue_joins.load(Ordering::Relaxed),
            matches_paired: self.matches_paired.load(Ordering::Relaxed),
            bot_fallbacks: self.bot_fallbacks.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            publish_retries: self.publish_retries.load(Ordering::Relaxed),
            breaker_rejections: self.breaker_rejections.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            consume_failures: self.consume_failures.load(Ordering::Relaxed),
            snapshots_flushed: self.snapshots_flushed.load(Ordering::Relaxed),
        }
    }
}
