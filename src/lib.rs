#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_arguments,
    clippy::too_many_lines
)]

//! # Connect Four Server
//!
//! Real-time multiplayer Connect Four: matchmaking with bot fallback,
//! concurrent game sessions over WebSockets with survivable disconnections,
//! and a durable analytics event stream.
//!
//! Runs entirely in-memory — the storage and broker seams accept external
//! backends, but none are required to play.

/// Analytics consumer and aggregate snapshots
pub mod analytics;

/// Server configuration and environment overrides
pub mod config;

/// Session engine: lifecycle, moves, cache, disconnect handling
pub mod engine;

/// Domain error taxonomy and wire-code mapping
pub mod errors;

/// Event types, broker transport, producer with retry and circuit breaker
pub mod events;

/// Board rules and game data model
pub mod game;

/// Connection hub, wire dispatch, and WebSocket plumbing
pub mod hub;

/// Structured logging configuration
pub mod logging;

/// FIFO matchmaking queue with bot fallback
pub mod matchmaking;

/// Process-wide metrics counters
pub mod metrics;

/// WebSocket message protocol definitions
pub mod protocol;

/// Storage abstraction (in-memory implementation)
pub mod storage;
