use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::matchmaking::MatchmakingConfig;

/// Matchmaking settings (file representation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Seconds in queue before bot fallback.
    pub match_timeout_secs: u64,
    /// Pairing pass cadence, seconds.
    pub match_interval_secs: u64,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            match_timeout_secs: 10,
            match_interval_secs: 1,
        }
    }
}

impl MatchmakingSettings {
    pub fn to_matchmaking_config(&self) -> MatchmakingConfig {
        MatchmakingConfig {
            match_timeout: Duration::from_secs(self.match_timeout_secs),
            match_interval: Duration::from_secs(self.match_interval_secs.max(1)),
        }
    }
}
