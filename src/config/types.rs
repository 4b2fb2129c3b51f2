use serde::{Deserialize, Serialize};

use super::events::{ConsumerSettings, EventsSettings};
use super::hub::HubSettings;
use super::logging::LoggingConfig;
use super::matchmaking::MatchmakingSettings;
use super::session::SessionSettings;

/// Root configuration, loadable from `config.json` with env overrides.
/// Every field and sub-config has working defaults so an empty file (or no
/// file at all) yields a runnable server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub cors_origins: String,
    pub session: SessionSettings,
    pub hub: HubSettings,
    pub matchmaking: MatchmakingSettings,
    pub events: EventsSettings,
    pub consumer: ConsumerSettings,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_origins: "*".to_string(),
            session: SessionSettings::default(),
            hub: HubSettings::default(),
            matchmaking: MatchmakingSettings::default(),
            events: EventsSettings::default(),
            consumer: ConsumerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}
