use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::events::{EventKind, GameEvent};

/// Periodic persisted record of the aggregate counters. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub games_completed_hour: u64,
    pub games_completed_day: u64,
    pub average_game_duration_secs: f64,
    pub total_moves: u64,
    pub unique_players_hour: u64,
}

#[derive(Debug, Default)]
struct AggregateState {
    total_moves: u64,
    games_completed_hour: u64,
    games_completed_day: u64,
    game_count: u64,
    total_game_duration_ms: u64,
    min_game_duration_ms: Option<u64>,
    max_game_duration_ms: Option<u64>,
    average_game_duration_ms: f64,
    wins_by_player: HashMap<String, u64>,
    unique_players_hour: HashSet<String>,
    day: Option<NaiveDate>,
}

impl AggregateState {
    fn roll_day_if_needed(&mut self, today: NaiveDate) {
        match self.day {
            Some(day) if day == today => {}
            _ => {
                self.day = Some(today);
                self.games_completed_day = 0;
            }
        }
    }
}

/// In-memory aggregates updated per consumed event.
///
/// The mutex is held only for the numeric update, which is pure CPU.
pub struct MetricsAggregator {
    state: Mutex<AggregateState>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregateState::default()),
        }
    }

    pub fn observe(&self, event: &GameEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .unique_players_hour
            .insert(event.player_id.clone());

        match event.event_type {
            EventKind::MoveMade => {
                state.total_moves += 1;
            }
            EventKind::GameCompleted => {
                state.roll_day_if_needed(Utc::now().date_naive());
                state.games_completed_hour += 1;
                state.games_completed_day += 1;
                state.game_count += 1;

                if let Some(duration_ms) = event
                    .metadata
                    .get("durationMs")
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    state.total_game_duration_ms += duration_ms;
                    state.min_game_duration_ms = Some(
                        state
                            .min_game_duration_ms
                            .map_or(duration_ms, |min| min.min(duration_ms)),
                    );
                    state.max_game_duration_ms = Some(
                        state
                            .max_game_duration_ms
                            .map_or(duration_ms, |max| max.max(duration_ms)),
                    );
                }
                state.average_game_duration_ms =
                    state.total_game_duration_ms as f64 / state.game_count as f64;

                if let Some(winner) = event.metadata.get("winner") {
                    if !winner.is_empty() && winner != "draw" {
                        *state.wins_by_player.entry(winner.clone()).or_insert(0) += 1;
                    }
                }
            }
            EventKind::GameStarted
            | EventKind::PlayerJoined
            | EventKind::PlayerLeft
            | EventKind::PlayerReconnected => {}
        }
    }

    /// Build a snapshot, then reset the hourly counters and the
    /// unique-player set. Daily counters roll with the UTC date.
    pub fn snapshot_and_reset_hourly(&self) -> AnalyticsSnapshot {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.roll_day_if_needed(Utc::now().date_naive());

        let snapshot = AnalyticsSnapshot {
            taken_at: Utc::now(),
            games_completed_hour: state.games_completed_hour,
            games_completed_day: state.games_completed_day,
            average_game_duration_secs: state.average_game_duration_ms / 1000.0,
            total_moves: state.total_moves,
            unique_players_hour: state.unique_players_hour.len() as u64,
        };

        state.games_completed_hour = 0;
        state.unique_players_hour.clear();
        snapshot
    }

    pub fn wins_for(&self, player: &str) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.wins_by_player.get(player).copied().unwrap_or(0)
    }

    pub fn total_moves(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_moves
    }

    pub fn game_duration_bounds_ms(&self) -> Option<(u64, u64)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .min_game_duration_ms
            .zip(state.max_game_duration_ms)
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
