#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use connect_four_server::analytics::AnalyticsConsumer;
use connect_four_server::config;
use connect_four_server::engine::{GameEngine, RandomBot};
use connect_four_server::events::{
    EventProducer, EventSink, EventTransport, InMemoryBroker, NoopEventSink,
};
use connect_four_server::hub::routes::AppState;
use connect_four_server::hub::{notifier, Hub, MessageHandler};
use connect_four_server::logging;
use connect_four_server::matchmaking::Matchmaker;
use connect_four_server::metrics::ServerMetrics;
use connect_four_server::storage::{create_store, StoreConfig};

/// Connect Four -- real-time multiplayer game server
#[derive(Parser, Debug)]
#[command(name = "connect-four-server")]
#[command(about = "Real-time multiplayer Connect Four server with matchmaking and analytics")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config.json if present, otherwise code defaults, then env overrides
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate(&cfg);
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Storage backend: InMemory");
                println!("  Events enabled: {}", cfg.events.enabled);
                println!(
                    "  Metrics aggregation: {}",
                    cfg.consumer.enable_metrics_aggregation
                );
                println!("  Disconnect timeout: {}s", cfg.session.disconnect_timeout_secs);
                println!("  Match timeout: {}s", cfg.matchmaking.match_timeout_secs);
                return Ok(());
            }
            Err(problems) => {
                eprintln!("Configuration validation failed:\n{problems}");
                std::process::exit(1);
            }
        }
    }
    validation_result.map_err(|problems| anyhow::anyhow!(problems))?;

    logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, "Starting Connect Four server");

    let cancel = CancellationToken::new();
    let metrics = Arc::new(ServerMetrics::new());

    let store = create_store(StoreConfig::InMemory);
    store.initialize().await?;

    // Event pipeline: producer + embedded analytics consumer over the
    // in-process broker, or a silent no-op sink when disabled
    let sink: Arc<dyn EventSink> = if cfg.events.enabled {
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new(cfg.events.partitions));
        let transport: Arc<dyn EventTransport> = broker.clone();

        let producer = Arc::new(EventProducer::new(
            transport.clone(),
            cfg.events.to_producer_config(),
            metrics.clone(),
        ));
        Arc::clone(&producer).spawn_health_probe(cancel.clone());

        let consumer = AnalyticsConsumer::new(
            transport,
            store.clone(),
            cfg.consumer.to_consumer_config(),
            metrics.clone(),
        );
        tokio::spawn(consumer.run(cancel.clone()));

        producer
    } else {
        tracing::info!("Event publishing disabled, using no-op producer");
        Arc::new(NoopEventSink)
    };

    let (engine, completions_rx) = GameEngine::new(
        store.clone(),
        sink,
        metrics.clone(),
        cfg.session.to_engine_config(),
    );
    tokio::spawn(engine.clone().run_cleanup(cancel.clone()));

    let (matchmaker, outcomes_rx) = Matchmaker::new(
        engine.clone(),
        cfg.matchmaking.to_matchmaking_config(),
        metrics.clone(),
    );
    tokio::spawn(matchmaker.clone().run(cancel.clone()));

    let hub = Hub::spawn(cfg.hub.to_hub_config(), metrics.clone(), cancel.clone());
    tokio::spawn(notifier::run_match_notifier(
        hub.clone(),
        outcomes_rx,
        cancel.clone(),
    ));
    tokio::spawn(notifier::run_completion_notifier(
        hub.clone(),
        completions_rx,
        cancel.clone(),
    ));

    let handler = Arc::new(MessageHandler::new(
        engine,
        matchmaker,
        hub.clone(),
        Arc::new(RandomBot),
    ));
    let state = AppState {
        hub,
        handler,
        metrics,
    };
    let router = connect_four_server::hub::routes::create_router(state, &cfg.cors_origins);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.cors_origins,
        "Server started - WebSocket: /ws, metrics: /metrics, liveness: /healthz"
    );

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            cancel.cancel();
        }
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
