//! Configuration: typed sub-configs with working defaults, a JSON file
//! loader with env overrides, and cross-field validation.

pub mod events;
pub mod hub;
pub mod loader;
pub mod logging;
pub mod matchmaking;
pub mod session;
pub mod types;
pub mod validation;

pub use events::{ConsumerSettings, EventsSettings};
pub use hub::HubSettings;
pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use matchmaking::MatchmakingSettings;
pub use session::SessionSettings;
pub use types::Config;
pub use validation::validate;
