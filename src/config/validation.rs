use super::types::Config;

/// Cross-field sanity checks. Returns every problem found, not just the
/// first one.
pub fn validate(config: &Config) -> Result<(), String> {
    let mut problems = Vec::new();

    if config.hub.ping_period_secs >= config.hub.pong_wait_secs {
        problems.push(format!(
            "hub.ping_period_secs ({}) must be strictly less than hub.pong_wait_secs ({})",
            config.hub.ping_period_secs, config.hub.pong_wait_secs
        ));
    }
    if config.hub.max_message_size == 0 {
        problems.push("hub.max_message_size must be positive".to_string());
    }
    if config.hub.outbound_queue == 0 {
        problems.push("hub.outbound_queue must be positive".to_string());
    }
    if config.events.failure_threshold == 0 {
        problems.push("events.failure_threshold must be positive".to_string());
    }
    if config.events.success_threshold == 0 {
        problems.push("events.success_threshold must be positive".to_string());
    }
    if config.events.partitions == 0 {
        problems.push("events.partitions must be positive".to_string());
    }
    if config.session.disconnect_timeout_secs == 0 {
        problems.push("session.disconnect_timeout_secs must be positive".to_string());
    }
    if config.matchmaking.match_timeout_secs == 0 {
        problems.push("matchmaking.match_timeout_secs must be positive".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("\n"))
    }
}
