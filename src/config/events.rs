use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analytics::ConsumerConfig;
use crate::events::{CircuitBreakerConfig, ProducerConfig};

/// Event producer settings (file representation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsSettings {
    /// When false a no-op producer is wired in and nothing is published.
    pub enabled: bool,
    /// Partition count for the in-process event log.
    pub partitions: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub breaker_timeout_secs: u64,
    pub health_check_period_secs: u64,
    pub health_check_timeout_secs: u64,
}

impl Default for EventsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            partitions: 8,
            max_retries: 3,
            retry_backoff_ms: 100,
            max_retry_backoff_ms: 5_000,
            failure_threshold: 5,
            success_threshold: 3,
            breaker_timeout_secs: 30,
            health_check_period_secs: 30,
            health_check_timeout_secs: 5,
        }
    }
}

impl EventsSettings {
    pub fn to_producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_retry_backoff: Duration::from_millis(self.max_retry_backoff_ms),
            breaker: CircuitBreakerConfig {
                failure_threshold: self.failure_threshold,
                success_threshold: self.success_threshold,
                timeout: Duration::from_secs(self.breaker_timeout_secs),
            },
            health_check_period: Duration::from_secs(self.health_check_period_secs.max(1)),
            health_check_timeout: Duration::from_secs(self.health_check_timeout_secs.max(1)),
        }
    }
}

/// Analytics consumer settings (file representation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub group: String,
    pub max_concurrent_processing: usize,
    pub processing_timeout_secs: u64,
    pub fetch_batch_size: usize,
    pub poll_interval_ms: u64,
    pub metrics_flush_interval_secs: u64,
    pub snapshot_flush_timeout_secs: u64,
    pub enable_metrics_aggregation: bool,
    pub update_player_stats: bool,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            group: "analytics".to_string(),
            max_concurrent_processing: 10,
            processing_timeout_secs: 30,
            fetch_batch_size: 64,
            poll_interval_ms: 200,
            metrics_flush_interval_secs: 60,
            snapshot_flush_timeout_secs: 10,
            enable_metrics_aggregation: true,
            update_player_stats: false,
        }
    }
}

impl ConsumerSettings {
    pub fn to_consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            group: self.group.clone(),
            max_concurrent_processing: self.max_concurrent_processing.max(1),
            processing_timeout: Duration::from_secs(self.processing_timeout_secs.max(1)),
            fetch_batch_size: self.fetch_batch_size.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
            metrics_flush_interval: Duration::from_secs(self.metrics_flush_interval_secs.max(1)),
            snapshot_flush_timeout: Duration::from_secs(self.snapshot_flush_timeout_secs.max(1)),
            enable_metrics_aggregation: self.enable_metrics_aggregation,
            update_player_stats: self.update_player_stats,
        }
    }
}
