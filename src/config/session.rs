use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::EngineConfig;

/// Session engine settings (file representation, seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Idle time before an active session is abandoned.
    pub session_timeout_secs: u64,
    /// Grace window for a disconnected player before forfeit.
    pub disconnect_timeout_secs: u64,
    /// Cleanup worker tick.
    pub cleanup_interval_secs: u64,
    /// Maximum idle age of a session cache entry.
    pub cache_max_age_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_timeout_secs: 30 * 60,
            disconnect_timeout_secs: 30,
            cleanup_interval_secs: 5,
            cache_max_age_secs: 10 * 60,
        }
    }
}

impl SessionSettings {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            disconnect_timeout: Duration::from_secs(self.disconnect_timeout_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs.max(1)),
            cache_max_age: Duration::from_secs(self.cache_max_age_secs),
        }
    }
}
