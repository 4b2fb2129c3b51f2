//! Analytics event pipeline: event types, broker transport, and the
//! retrying, circuit-broken producer.

pub mod broker;
pub mod circuit_breaker;
pub mod producer;
pub mod types;

pub use broker::{EventTransport, FetchedRecord, InMemoryBroker, Record, TransportError};
pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use producer::{
    BackgroundPublisher, EventProducer, EventSink, NoopEventSink, ProducerConfig, PublishError,
};
pub use types::{EventKind, GameEvent};
