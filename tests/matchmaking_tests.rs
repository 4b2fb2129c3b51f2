//! Matchmaking integration tests with the ticker actually running.

use std::sync::Arc;
use std::time::Duration;

use connect_four_server::engine::{EngineConfig, GameEngine};
use connect_four_server::events::NoopEventSink;
use connect_four_server::game::{is_bot_handle, GameStatus};
use connect_four_server::matchmaking::{MatchOutcome, Matchmaker, MatchmakingConfig};
use connect_four_server::metrics::ServerMetrics;
use connect_four_server::storage::{GameStore, InMemoryStore};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct Rig {
    matchmaker: Arc<Matchmaker>,
    outcomes: UnboundedReceiver<MatchOutcome>,
    store: Arc<InMemoryStore>,
    cancel: CancellationToken,
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn rig(config: MatchmakingConfig) -> Rig {
    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(ServerMetrics::new());
    let (engine, _completions) = GameEngine::new(
        store.clone(),
        Arc::new(NoopEventSink),
        metrics.clone(),
        EngineConfig::default(),
    );
    let (matchmaker, outcomes) = Matchmaker::new(engine, config, metrics);

    let cancel = CancellationToken::new();
    tokio::spawn(matchmaker.clone().run(cancel.clone()));

    Rig {
        matchmaker,
        outcomes,
        store,
        cancel,
    }
}

async fn next_outcome(rig: &mut Rig) -> MatchOutcome {
    timeout(Duration::from_secs(3), rig.outcomes.recv())
        .await
        .expect("outcome within timeout")
        .expect("channel open")
}

#[tokio::test]
async fn two_queued_players_get_paired_by_the_ticker() {
    let mut rig = rig(MatchmakingConfig {
        match_timeout: Duration::from_secs(10),
        match_interval: Duration::from_millis(20),
    });

    rig.matchmaker.join("alice").await.unwrap();
    rig.matchmaker.join("bob").await.unwrap();

    match next_outcome(&mut rig).await {
        MatchOutcome::Paired { session } => {
            assert_eq!(session.player1, "alice");
            assert_eq!(session.player2, "bob");
            assert_eq!(session.status, GameStatus::InProgress);

            let stored = rig.store.get_session(&session.id).await.unwrap().unwrap();
            assert_eq!(stored.status, GameStatus::InProgress);
        }
        MatchOutcome::BotFallback { .. } => panic!("expected a PvP pairing"),
    }
    assert_eq!(rig.matchmaker.queue_len(), 0);
}

#[tokio::test]
async fn lone_player_falls_back_to_a_bot_session() {
    let mut rig = rig(MatchmakingConfig {
        match_timeout: Duration::from_millis(50),
        match_interval: Duration::from_millis(20),
    });

    rig.matchmaker.join("alice").await.unwrap();

    match next_outcome(&mut rig).await {
        MatchOutcome::BotFallback { session } => {
            assert_eq!(session.player1, "alice");
            assert!(is_bot_handle(&session.player2));
            assert_eq!(session.status, GameStatus::InProgress);
        }
        MatchOutcome::Paired { .. } => panic!("expected bot fallback"),
    }
    assert_eq!(rig.matchmaker.queue_len(), 0);
}

#[tokio::test]
async fn a_matched_player_cannot_requeue_until_the_game_ends() {
    let mut rig = rig(MatchmakingConfig {
        match_timeout: Duration::from_secs(10),
        match_interval: Duration::from_millis(20),
    });

    rig.matchmaker.join("alice").await.unwrap();
    rig.matchmaker.join("bob").await.unwrap();
    let _outcome = next_outcome(&mut rig).await;

    let err = rig.matchmaker.join("alice").await.unwrap_err();
    assert!(matches!(
        err,
        connect_four_server::errors::GameError::AlreadyInGame(_)
    ));
}

#[tokio::test]
async fn leaving_before_the_tick_prevents_matching() {
    let mut rig = rig(MatchmakingConfig {
        match_timeout: Duration::from_millis(80),
        match_interval: Duration::from_millis(20),
    });

    rig.matchmaker.join("alice").await.unwrap();
    assert!(rig.matchmaker.leave("alice"));

    // Neither a pairing nor a bot fallback should ever arrive
    assert!(
        timeout(Duration::from_millis(200), rig.outcomes.recv())
            .await
            .is_err(),
        "dequeued player must not be matched"
    );
}

#[tokio::test]
async fn odd_player_out_waits_for_the_next_arrival() {
    let mut rig = rig(MatchmakingConfig {
        match_timeout: Duration::from_secs(10),
        match_interval: Duration::from_millis(20),
    });

    for handle in ["p1", "p2", "p3"] {
        rig.matchmaker.join(handle).await.unwrap();
    }

    let first = next_outcome(&mut rig).await;
    assert_eq!(first.session().player1, "p1");
    assert_eq!(first.session().player2, "p2");
    assert_eq!(rig.matchmaker.queue_len(), 1);
    assert!(rig.matchmaker.status("p3").is_some());

    rig.matchmaker.join("p4").await.unwrap();
    let second = next_outcome(&mut rig).await;
    assert_eq!(second.session().player1, "p3");
    assert_eq!(second.session().player2, "p4");
}
