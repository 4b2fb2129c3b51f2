use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::ServerMetrics;

use super::broker::{EventTransport, Record, TransportError};
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::types::GameEvent;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("producer is unhealthy, publish rejected")]
    Unhealthy,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Anything gameplay code can hand events to. Loss is accounted here, never
/// surfaced to the move path.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &GameEvent) -> Result<(), PublishError>;
}

/// Ordered fire-and-forget front for an [`EventSink`].
///
/// Gameplay enqueues and moves on; one worker drains the queue and awaits
/// each publish in turn, so events reach the transport in emission order and
/// a session's events stay ordered within their partition. Failures are
/// logged and counted by the producer, never surfaced to the move path.
#[derive(Clone)]
pub struct BackgroundPublisher {
    queue: tokio::sync::mpsc::UnboundedSender<GameEvent>,
}

impl BackgroundPublisher {
    pub fn spawn(sink: Arc<dyn EventSink>) -> Self {
        let (queue, mut rx) = tokio::sync::mpsc::unbounded_channel::<GameEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = sink.publish(&event).await {
                    debug!(
                        event_type = %event.event_type,
                        game_id = %event.game_id,
                        error = %err,
                        "Dropped analytics event"
                    );
                }
            }
        });
        Self { queue }
    }

    pub fn enqueue(&self, event: GameEvent) {
        // Send only fails when the worker is gone, i.e. at shutdown
        let _ = self.queue.send(event);
    }
}

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub retry_backoff: Duration,
    /// Backoff ceiling.
    pub max_retry_backoff: Duration,
    pub breaker: CircuitBreakerConfig,
    pub health_check_period: Duration,
    pub health_check_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            max_retry_backoff: Duration::from_secs(5),
            breaker: CircuitBreakerConfig::default(),
            health_check_period: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

/// Retrying, circuit-broken event producer.
///
/// Records are keyed by session id so a session's events stay ordered within
/// one partition. Retries apply only to transient transport failures; the
/// breaker and the health probe decide whether publishes are admitted at all.
pub struct EventProducer {
    transport: Arc<dyn EventTransport>,
    breaker: CircuitBreaker,
    config: ProducerConfig,
    metrics: Arc<ServerMetrics>,
    healthy: AtomicBool,
}

impl EventProducer {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        config: ProducerConfig,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self {
            transport,
            breaker,
            config,
            metrics,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn breaker_state(&self) -> super::circuit_breaker::BreakerState {
        self.breaker.state()
    }

    fn record_for(event: &GameEvent) -> Result<Record, serde_json::Error> {
        let payload = serde_json::to_vec(event)?;
        Ok(Record {
            key: event.partition_key(),
            payload,
            headers: vec![
                ("event_type".to_string(), event.event_type.as_str().to_string()),
                ("timestamp".to_string(), event.timestamp.to_rfc3339()),
            ],
        })
    }

    async fn publish_with_retry(&self, record: Record) -> Result<(), PublishError> {
        let mut attempt = 0u32;
        let mut delay = self.config.retry_backoff;

        loop {
            match self.transport.publish(record.clone()).await {
                Ok(()) => {
                    self.breaker.record_success();
                    self.metrics.increment_events_published();
                    if attempt > 0 {
                        debug!(attempt, key = %record.key, "Publish succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        self.breaker.record_failure();
                        self.metrics.increment_events_failed();
                        warn!(
                            key = %record.key,
                            attempt,
                            error = %err,
                            retryable = err.is_retryable(),
                            "Event publish failed"
                        );
                        return Err(err.into());
                    }

                    attempt += 1;
                    self.metrics.increment_publish_retries();
                    debug!(
                        key = %record.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying event publish"
                    );
                    sleep(with_jitter(delay)).await;
                    delay = (delay * 2).min(self.config.max_retry_backoff);
                }
            }
        }
    }

    /// Probe the broker control connection every `health_check_period`;
    /// an unhealthy probe makes the producer reject publishes outright until
    /// the next healthy one.
    pub fn spawn_health_probe(self: Arc<Self>, cancel: CancellationToken) {
        let producer = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(producer.config.health_check_period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let healthy = tokio::time::timeout(
                            producer.config.health_check_timeout,
                            producer.transport.health_check(),
                        )
                        .await
                        .map(|r| r.is_ok())
                        .unwrap_or(false);

                        let was = producer.healthy.swap(healthy, Ordering::Relaxed);
                        if was && !healthy {
                            warn!("Broker health probe failed, suspending publishes");
                        } else if !was && healthy {
                            info!("Broker health probe recovered");
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl EventSink for EventProducer {
    async fn publish(&self, event: &GameEvent) -> Result<(), PublishError> {
        if !self.is_healthy() {
            self.metrics.increment_events_failed();
            return Err(PublishError::Unhealthy);
        }
        if !self.breaker.try_acquire() {
            self.metrics.increment_breaker_rejections();
            return Err(PublishError::CircuitOpen);
        }

        let record = Self::record_for(event)?;
        self.publish_with_retry(record).await
    }
}

/// Producer used when no broker is configured: publishes succeed silently so
/// the rest of the system runs unchanged.
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: &GameEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let jitter_cap = (delay.as_millis() as u64) / 10;
    if jitter_cap == 0 {
        return delay;
    }
    delay + Duration::from_millis(fastrand::u64(0..=jitter_cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::broker::InMemoryBroker;
    use crate::events::circuit_breaker::BreakerState;
    use crate::events::types::EventKind;
    use crate::game::GameId;
    use std::sync::atomic::AtomicU32;

    struct FlakyTransport {
        failures_left: AtomicU32,
        error: fn() -> TransportError,
        inner: InMemoryBroker,
    }

    impl FlakyTransport {
        fn new(failures: u32, error: fn() -> TransportError) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                error,
                inner: InMemoryBroker::new(1),
            }
        }
    }

    #[async_trait]
    impl EventTransport for FlakyTransport {
        async fn publish(&self, record: Record) -> Result<(), TransportError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err((self.error)());
            }
            self.inner.publish(record).await
        }

        async fn subscribe(&self, group: &str) -> Result<(), TransportError> {
            self.inner.subscribe(group).await
        }

        async fn fetch(
            &self,
            group: &str,
            max: usize,
        ) -> Result<Vec<super::super::broker::FetchedRecord>, TransportError> {
            self.inner.fetch(group, max).await
        }

        async fn commit(
            &self,
            group: &str,
            partition: usize,
            offset: u64,
        ) -> Result<(), TransportError> {
            self.inner.commit(group, partition, offset).await
        }

        async fn seek_to_committed(&self, group: &str) -> Result<(), TransportError> {
            self.inner.seek_to_committed(group).await
        }

        async fn health_check(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn test_config() -> ProducerConfig {
        ProducerConfig {
            max_retries: 3,
            retry_backoff: Duration::from_millis(1),
            max_retry_backoff: Duration::from_millis(4),
            breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                timeout: Duration::from_secs(30),
            },
            health_check_period: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
        }
    }

    fn event() -> GameEvent {
        GameEvent::new(EventKind::MoveMade, GameId::new_v4(), "alice")
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let transport = Arc::new(FlakyTransport::new(2, || {
            TransportError::BrokerUnavailable("down".into())
        }));
        let metrics = Arc::new(ServerMetrics::new());
        let producer = EventProducer::new(transport.clone(), test_config(), metrics.clone());

        producer.publish(&event()).await.unwrap();
        assert_eq!(transport.inner.record_count().await, 1);
        assert_eq!(metrics.snapshot().publish_retries, 2);
        assert_eq!(metrics.snapshot().events_published, 1);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX, || TransportError::Cancelled));
        let metrics = Arc::new(ServerMetrics::new());
        let producer = EventProducer::new(transport, test_config(), metrics.clone());

        let err = producer.publish(&event()).await.unwrap_err();
        assert!(matches!(err, PublishError::Transport(TransportError::Cancelled)));
        assert_eq!(metrics.snapshot().publish_retries, 0);
        assert_eq!(metrics.snapshot().events_failed, 1);
    }

    #[tokio::test]
    async fn breaker_opens_and_rejects_after_sustained_failures() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX, || {
            TransportError::ConnectionRefused("nope".into())
        }));
        let metrics = Arc::new(ServerMetrics::new());
        let producer = EventProducer::new(transport, test_config(), metrics.clone());

        // failure_threshold = 2: two exhausted publishes open the circuit
        assert!(producer.publish(&event()).await.is_err());
        assert!(producer.publish(&event()).await.is_err());
        assert_eq!(producer.breaker_state(), BreakerState::Open);

        let err = producer.publish(&event()).await.unwrap_err();
        assert!(matches!(err, PublishError::CircuitOpen));
        assert_eq!(metrics.snapshot().breaker_rejections, 1);
    }

    #[tokio::test]
    async fn noop_sink_swallows_everything() {
        let sink = NoopEventSink;
        sink.publish(&event()).await.unwrap();
    }
}
