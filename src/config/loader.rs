use std::path::Path;
use tracing::warn;

use super::types::Config;

/// Load configuration: `config.json` (or `$CONFIG_PATH`) if present,
/// otherwise code defaults, then env overrides.
pub fn load() -> Config {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let mut config = load_from_path(Path::new(&path));
    apply_env_overrides(&mut config);
    config
}

fn load_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                // A malformed file should be loud but not fatal
                eprintln!(
                    "Failed to parse config file {}: {err}. Using defaults.",
                    path.display()
                );
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(port) = std::env::var("PORT") {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(_) => warn!(value = %port, "Ignoring unparseable PORT override"),
        }
    }
    if let Ok(origins) = std::env::var("CORS_ORIGINS") {
        config.cors_origins = origins;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_from_path(Path::new("/nonexistent/config.json"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.hub.ping_period_secs, 54);
    }

    #[test]
    fn partial_file_keeps_defaults_for_rest() {
        let parsed: Config = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.session.disconnect_timeout_secs, 30);
        assert_eq!(parsed.matchmaking.match_timeout_secs, 10);
    }
}
