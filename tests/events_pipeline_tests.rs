//! End-to-end event pipeline: engine -> producer -> in-process broker ->
//! analytics consumer -> store and aggregates.

use std::sync::Arc;
use std::time::Duration;

use connect_four_server::analytics::{AnalyticsConsumer, ConsumerConfig};
use connect_four_server::engine::{EngineConfig, GameEngine};
use connect_four_server::events::{
    EventKind, EventProducer, EventTransport, InMemoryBroker, ProducerConfig,
};
use connect_four_server::metrics::ServerMetrics;
use connect_four_server::storage::{GameStore, InMemoryStore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct Pipeline {
    engine: Arc<GameEngine>,
    store: Arc<InMemoryStore>,
    consumer: Arc<AnalyticsConsumer>,
    cancel: CancellationToken,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn pipeline() -> Pipeline {
    let metrics = Arc::new(ServerMetrics::new());
    let store = Arc::new(InMemoryStore::new());
    let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new(8));
    let transport: Arc<dyn EventTransport> = broker;

    let producer = Arc::new(EventProducer::new(
        transport.clone(),
        ProducerConfig::default(),
        metrics.clone(),
    ));

    let consumer = AnalyticsConsumer::new(
        transport,
        store.clone(),
        ConsumerConfig {
            poll_interval: Duration::from_millis(10),
            ..ConsumerConfig::default()
        },
        metrics.clone(),
    );
    let cancel = CancellationToken::new();
    tokio::spawn(consumer.clone().run(cancel.clone()));

    let (engine, _completions) =
        GameEngine::new(store.clone(), producer, metrics, EngineConfig::default());

    Pipeline {
        engine,
        store,
        consumer,
        cancel,
    }
}

async fn wait_for_events(store: &InMemoryStore, count: usize) -> Vec<connect_four_server::events::GameEvent> {
    timeout(Duration::from_secs(5), async {
        loop {
            let events = store.events().await;
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("consumer should observe the expected events")
}

#[tokio::test]
async fn session_events_arrive_in_wall_clock_order() {
    let pipeline = pipeline();
    let session = pipeline
        .engine
        .create_session("alice", "bob")
        .await
        .unwrap();

    // Vertical win for Red in 7 moves
    for _ in 0..3 {
        pipeline.engine.apply_move(session.id, "alice", 3).await.unwrap();
        pipeline.engine.apply_move(session.id, "bob", 4).await.unwrap();
    }
    pipeline.engine.apply_move(session.id, "alice", 3).await.unwrap();

    // GameStarted + 7 MoveMade + GameCompleted
    let events = wait_for_events(&pipeline.store, 9).await;
    let for_session: Vec<_> = events
        .iter()
        .filter(|e| e.game_id == session.id)
        .collect();
    assert_eq!(for_session.len(), 9);

    assert_eq!(for_session[0].event_type, EventKind::GameStarted);
    for (index, event) in for_session[1..8].iter().enumerate() {
        assert_eq!(event.event_type, EventKind::MoveMade);
        assert_eq!(
            event.metadata.get("moveNumber").map(String::as_str),
            Some((index + 1).to_string().as_str())
        );
    }
    let completed = for_session[8];
    assert_eq!(completed.event_type, EventKind::GameCompleted);
    assert_eq!(completed.metadata.get("winner").map(String::as_str), Some("alice"));
    assert_eq!(
        completed.metadata.get("reason").map(String::as_str),
        Some("connect_four")
    );
    assert!(completed.metadata.contains_key("durationMs"));

    // Timestamps never go backwards within the session
    assert!(for_session
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn aggregates_reflect_consumed_events() {
    let pipeline = pipeline();
    let session = pipeline
        .engine
        .create_session("alice", "bob")
        .await
        .unwrap();
    for _ in 0..3 {
        pipeline.engine.apply_move(session.id, "alice", 3).await.unwrap();
        pipeline.engine.apply_move(session.id, "bob", 4).await.unwrap();
    }
    pipeline.engine.apply_move(session.id, "alice", 3).await.unwrap();

    wait_for_events(&pipeline.store, 9).await;

    let aggregates = pipeline.consumer.aggregates();
    assert_eq!(aggregates.total_moves(), 7);
    assert_eq!(aggregates.wins_for("alice"), 1);
    assert_eq!(aggregates.wins_for("bob"), 0);
}

#[tokio::test]
async fn snapshots_capture_and_reset_the_hourly_window() {
    let pipeline = pipeline();
    let session = pipeline
        .engine
        .create_session("alice", "bob")
        .await
        .unwrap();
    for _ in 0..3 {
        pipeline.engine.apply_move(session.id, "alice", 3).await.unwrap();
        pipeline.engine.apply_move(session.id, "bob", 4).await.unwrap();
    }
    pipeline.engine.apply_move(session.id, "alice", 3).await.unwrap();
    wait_for_events(&pipeline.store, 9).await;

    pipeline.consumer.flush_snapshot().await;
    let snapshots = pipeline.store.get_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].games_completed_hour, 1);
    assert_eq!(snapshots[0].total_moves, 7);
    assert!(snapshots[0].unique_players_hour >= 2);

    // The hourly window resets; totals carry over
    pipeline.consumer.flush_snapshot().await;
    let snapshots = pipeline.store.get_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1].games_completed_hour, 0);
    assert_eq!(snapshots[1].games_completed_day, 1);
    assert_eq!(snapshots[1].total_moves, 7);
}

#[tokio::test]
async fn multiple_sessions_interleave_without_mixing_per_session_order() {
    let pipeline = pipeline();
    let first = pipeline.engine.create_session("alice", "bob").await.unwrap();
    let second = pipeline.engine.create_session("carol", "dave").await.unwrap();

    pipeline.engine.apply_move(first.id, "alice", 0).await.unwrap();
    pipeline.engine.apply_move(second.id, "carol", 6).await.unwrap();
    pipeline.engine.apply_move(first.id, "bob", 1).await.unwrap();
    pipeline.engine.apply_move(second.id, "dave", 5).await.unwrap();

    // 2 GameStarted + 4 MoveMade
    let events = wait_for_events(&pipeline.store, 6).await;

    for id in [first.id, second.id] {
        let session_events: Vec<_> = events.iter().filter(|e| e.game_id == id).collect();
        assert_eq!(session_events[0].event_type, EventKind::GameStarted);
        let move_numbers: Vec<_> = session_events[1..]
            .iter()
            .filter_map(|e| e.metadata.get("moveNumber"))
            .collect();
        assert_eq!(move_numbers, vec!["1", "2"]);
    }
}
