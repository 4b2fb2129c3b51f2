use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventKind, EventTransport, FetchedRecord, GameEvent};
use crate::game::PlayerStats;
use crate::metrics::ServerMetrics;
use crate::storage::GameStore;

use super::aggregates::MetricsAggregator;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group name; a new group reads from earliest.
    pub group: String,
    /// Bound on concurrently processed partitions.
    pub max_concurrent_processing: usize,
    /// Per-message processing deadline.
    pub processing_timeout: Duration,
    /// Records per fetch.
    pub fetch_batch_size: usize,
    /// Idle poll sleep when the log has nothing new.
    pub poll_interval: Duration,
    /// Snapshot cadence.
    pub metrics_flush_interval: Duration,
    /// Deadline for persisting one snapshot.
    pub snapshot_flush_timeout: Duration,
    pub enable_metrics_aggregation: bool,
    /// Upsert winner/loser stats from GameCompleted events. Off by default
    /// here because the session engine already owns stats updates when both
    /// run against one store.
    pub update_player_stats: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: "analytics".to_string(),
            max_concurrent_processing: 10,
            processing_timeout: Duration::from_secs(30),
            fetch_batch_size: 64,
            poll_interval: Duration::from_millis(200),
            metrics_flush_interval: Duration::from_secs(60),
            snapshot_flush_timeout: Duration::from_secs(10),
            enable_metrics_aggregation: true,
            update_player_stats: false,
        }
    }
}

/// Analytics consumer: fetches the event log as a named group, persists raw
/// events, folds them into the aggregates, and flushes periodic snapshots.
///
/// Partitions are processed in parallel (bounded), records within one
/// partition strictly in order, so per-session event order is preserved.
/// Offsets are committed only after a record is processed; a transient
/// failure rewinds delivery to the committed position and retries, while an
/// undecodable record is logged and committed past.
pub struct AnalyticsConsumer {
    transport: Arc<dyn EventTransport>,
    store: Arc<dyn GameStore>,
    aggregates: Arc<MetricsAggregator>,
    config: ConsumerConfig,
    metrics: Arc<ServerMetrics>,
    processing_slots: Arc<Semaphore>,
}

impl AnalyticsConsumer {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        store: Arc<dyn GameStore>,
        config: ConsumerConfig,
        metrics: Arc<ServerMetrics>,
    ) -> Arc<Self> {
        let processing_slots = Arc::new(Semaphore::new(config.max_concurrent_processing.max(1)));
        Arc::new(Self {
            transport,
            store,
            aggregates: Arc::new(MetricsAggregator::new()),
            config,
            metrics,
            processing_slots,
        })
    }

    pub fn aggregates(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.aggregates)
    }

    /// Fetch loop plus the snapshot flusher. Runs until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if let Err(err) = self.transport.subscribe(&self.config.group).await {
            warn!(group = %self.config.group, error = %err, "Consumer subscription failed");
            return;
        }
        info!(group = %self.config.group, "Analytics consumer subscribed");

        if self.config.enable_metrics_aggregation {
            tokio::spawn(Arc::clone(&self).run_snapshot_flusher(cancel.clone()));
        }

        loop {
            if cancel.is_cancelled() {
                info!("Analytics consumer shutting down");
                break;
            }

            let records = match self
                .transport
                .fetch(&self.config.group, self.config.fetch_batch_size)
                .await
            {
                Ok(records) => records,
                Err(err) => {
                    warn!(error = %err, "Event fetch failed");
                    self.idle_sleep(&cancel).await;
                    continue;
                }
            };

            if records.is_empty() {
                self.idle_sleep(&cancel).await;
                continue;
            }

            let needs_rewind = Arc::clone(&self).process_batch(records).await;
            if needs_rewind {
                if let Err(err) = self.transport.seek_to_committed(&self.config.group).await {
                    warn!(error = %err, "Failed to rewind to committed offsets");
                }
            }
        }
    }

    async fn idle_sleep(&self, cancel: &CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(self.config.poll_interval) => {}
        }
    }

    /// Process one fetch batch. Returns whether delivery must rewind because
    /// a record hit a transient failure before its offset was committed.
    async fn process_batch(self: Arc<Self>, records: Vec<FetchedRecord>) -> bool {
        let mut by_partition: BTreeMap<usize, Vec<FetchedRecord>> = BTreeMap::new();
        for record in records {
            by_partition.entry(record.partition).or_default().push(record);
        }

        let mut tasks = Vec::with_capacity(by_partition.len());
        for (partition, partition_records) in by_partition {
            let consumer = Arc::clone(&self);
            tasks.push(tokio::spawn(async move {
                let _permit = consumer
                    .processing_slots
                    .acquire()
                    .await
                    .expect("semaphore never closed");
                consumer.process_partition(partition, partition_records).await
            }));
        }

        let mut needs_rewind = false;
        for task in tasks {
            match task.await {
                Ok(rewind) => needs_rewind |= rewind,
                Err(err) => {
                    warn!(error = %err, "Partition processing task panicked");
                    needs_rewind = true;
                }
            }
        }
        needs_rewind
    }

    /// Records of one partition, strictly in order. Stops at the first
    /// transient failure so the committed offset marks exactly the
    /// processed prefix.
    async fn process_partition(&self, partition: usize, records: Vec<FetchedRecord>) -> bool {
        for fetched in records {
            let outcome = timeout(
                self.config.processing_timeout,
                self.process_record(&fetched),
            )
            .await;

            match outcome {
                Ok(Ok(())) => {
                    if let Err(err) = self
                        .transport
                        .commit(&self.config.group, partition, fetched.offset)
                        .await
                    {
                        warn!(partition, offset = fetched.offset, error = %err, "Offset commit failed");
                        return true;
                    }
                }
                Ok(Err(err)) => {
                    self.metrics.increment_consume_failures();
                    warn!(
                        partition,
                        offset = fetched.offset,
                        error = %err,
                        "Event processing failed, will retry from committed offset"
                    );
                    return true;
                }
                Err(_) => {
                    self.metrics.increment_consume_failures();
                    warn!(
                        partition,
                        offset = fetched.offset,
                        "Event processing timed out, will retry from committed offset"
                    );
                    return true;
                }
            }
        }
        false
    }

    /// One record: decode, persist raw, fold into aggregates, optionally
    /// upsert stats. A decode failure is poison — logged and treated as
    /// processed so the offset commits past it.
    async fn process_record(&self, fetched: &FetchedRecord) -> Result<()> {
        let event: GameEvent = match serde_json::from_slice(&fetched.record.payload) {
            Ok(event) => event,
            Err(err) => {
                self.metrics.increment_consume_failures();
                warn!(
                    partition = fetched.partition,
                    offset = fetched.offset,
                    error = %err,
                    "Skipping undecodable event"
                );
                return Ok(());
            }
        };

        self.store.record_event(&event).await?;

        if self.config.enable_metrics_aggregation {
            self.aggregates.observe(&event);
        }
        if self.config.update_player_stats && event.event_type == EventKind::GameCompleted {
            self.upsert_stats_from(&event).await?;
        }

        self.metrics.increment_events_consumed();
        debug!(
            event_type = %event.event_type,
            game_id = %event.game_id,
            "Consumed analytics event"
        );
        Ok(())
    }

    /// Winner and loser both played; only the winner's tally grows.
    async fn upsert_stats_from(&self, event: &GameEvent) -> Result<()> {
        let winner = event
            .metadata
            .get("winner")
            .filter(|w| !w.is_empty() && w.as_str() != "draw");

        for key in ["player1", "player2"] {
            let Some(handle) = event.metadata.get(key) else {
                continue;
            };
            let won = winner.is_some_and(|w| w == handle);
            let mut stats = match self.store.get_stats(handle).await? {
                Some(stats) => stats,
                None => PlayerStats::new(handle.clone()),
            };
            stats.record_result(won);
            self.store.upsert_stats(&stats).await?;
        }
        Ok(())
    }

    async fn run_snapshot_flusher(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.metrics_flush_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately and would flush an empty snapshot
        interval.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Snapshot flusher shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.flush_snapshot().await;
                }
            }
        }
    }

    /// Persist a snapshot and reset the hourly window. Public so tests can
    /// flush without waiting out the interval.
    pub async fn flush_snapshot(&self) {
        let snapshot = self.aggregates.snapshot_and_reset_hourly();
        match timeout(
            self.config.snapshot_flush_timeout,
            self.store.record_snapshot(&snapshot),
        )
        .await
        {
            Ok(Ok(())) => {
                self.metrics.increment_snapshots_flushed();
                debug!(
                    games_hour = snapshot.games_completed_hour,
                    total_moves = snapshot.total_moves,
                    "Persisted analytics snapshot"
                );
            }
            Ok(Err(err)) => warn!(error = %err, "Snapshot persistence failed"),
            Err(_) => warn!("Snapshot persistence timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InMemoryBroker, Record};
    use crate::game::GameId;
    use crate::storage::InMemoryStore;

    fn publishable(event: &GameEvent) -> Record {
        Record {
            key: event.partition_key(),
            payload: serde_json::to_vec(event).unwrap(),
            headers: Vec::new(),
        }
    }

    fn consumer_with(
        broker: Arc<InMemoryBroker>,
        store: Arc<InMemoryStore>,
        config: ConsumerConfig,
    ) -> Arc<AnalyticsConsumer> {
        AnalyticsConsumer::new(broker, store, config, Arc::new(ServerMetrics::new()))
    }

    #[tokio::test]
    async fn consumes_persists_and_aggregates() {
        let broker = Arc::new(InMemoryBroker::new(4));
        let store = Arc::new(InMemoryStore::new());
        let game_id = GameId::new_v4();

        let events = [
            GameEvent::new(EventKind::GameStarted, game_id, "alice"),
            GameEvent::new(EventKind::MoveMade, game_id, "alice"),
            GameEvent::new(EventKind::MoveMade, game_id, "bob"),
            GameEvent::new(EventKind::GameCompleted, game_id, "alice")
                .with_metadata("winner", "alice")
                .with_metadata("durationMs", "5000"),
        ];
        for event in &events {
            broker.publish(publishable(event)).await.unwrap();
        }

        let consumer = consumer_with(broker.clone(), store.clone(), ConsumerConfig::default());
        broker.subscribe("analytics").await.unwrap();
        let fetched = broker.fetch("analytics", 100).await.unwrap();
        assert!(!Arc::clone(&consumer).process_batch(fetched).await);

        let persisted = store.events().await;
        assert_eq!(persisted.len(), 4);
        // Per-session order is preserved
        assert_eq!(persisted[0].event_type, EventKind::GameStarted);
        assert_eq!(persisted[3].event_type, EventKind::GameCompleted);

        let aggregates = consumer.aggregates();
        assert_eq!(aggregates.total_moves(), 2);
        assert_eq!(aggregates.wins_for("alice"), 1);
    }

    #[tokio::test]
    async fn poison_records_are_committed_past() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let store = Arc::new(InMemoryStore::new());

        broker
            .publish(Record {
                key: "k".into(),
                payload: b"not json".to_vec(),
                headers: Vec::new(),
            })
            .await
            .unwrap();
        let good = GameEvent::new(EventKind::MoveMade, GameId::new_v4(), "alice");
        broker.publish(publishable(&good)).await.unwrap();

        let consumer = consumer_with(broker.clone(), store.clone(), ConsumerConfig::default());
        broker.subscribe("analytics").await.unwrap();
        let fetched = broker.fetch("analytics", 100).await.unwrap();
        assert!(!Arc::clone(&consumer).process_batch(fetched).await);

        // Only the good record persisted, and nothing is redelivered
        assert_eq!(store.events().await.len(), 1);
        broker.seek_to_committed("analytics").await.unwrap();
        assert!(broker.fetch("analytics", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_upserts_track_winner_and_loser_when_enabled() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let store = Arc::new(InMemoryStore::new());
        let event = GameEvent::new(EventKind::GameCompleted, GameId::new_v4(), "alice")
            .with_metadata("winner", "alice")
            .with_metadata("player1", "alice")
            .with_metadata("player2", "bob")
            .with_metadata("durationMs", "1000");
        broker.publish(publishable(&event)).await.unwrap();

        let consumer = consumer_with(
            broker.clone(),
            store.clone(),
            ConsumerConfig {
                update_player_stats: true,
                ..ConsumerConfig::default()
            },
        );
        broker.subscribe("analytics").await.unwrap();
        let fetched = broker.fetch("analytics", 100).await.unwrap();
        assert!(!Arc::clone(&consumer).process_batch(fetched).await);

        let alice = store.get_stats("alice").await.unwrap().unwrap();
        assert_eq!((alice.games_played, alice.games_won), (1, 1));
        let bob = store.get_stats("bob").await.unwrap().unwrap();
        assert_eq!((bob.games_played, bob.games_won), (1, 0));
    }

    #[tokio::test]
    async fn snapshot_flush_appends_to_store() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let store = Arc::new(InMemoryStore::new());
        let consumer = consumer_with(broker.clone(), store.clone(), ConsumerConfig::default());

        consumer
            .aggregates()
            .observe(&GameEvent::new(EventKind::MoveMade, GameId::new_v4(), "alice"));
        consumer.flush_snapshot().await;
        consumer.flush_snapshot().await;

        let snapshots = store.get_snapshots().await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].total_moves, 1);
    }
}
