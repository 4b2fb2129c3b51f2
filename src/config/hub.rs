use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::hub::HubConfig;

/// Connection hub settings (file representation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Per-frame write deadline, seconds.
    pub write_wait_secs: u64,
    /// Read deadline, seconds. Pings must arrive faster than this.
    pub pong_wait_secs: u64,
    /// Ping cadence, seconds. Must stay below `pong_wait_secs`.
    pub ping_period_secs: u64,
    /// Maximum inbound frame size, bytes.
    pub max_message_size: usize,
    /// Connections unseen for this long are swept, seconds.
    pub stale_threshold_secs: u64,
    /// Stale sweep cadence, seconds.
    pub sweep_interval_secs: u64,
    /// Outbound frame queue capacity per connection.
    pub outbound_queue: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            write_wait_secs: 10,
            pong_wait_secs: 60,
            ping_period_secs: 54,
            max_message_size: 512,
            stale_threshold_secs: 5 * 60,
            sweep_interval_secs: 30,
            outbound_queue: 256,
        }
    }
}

impl HubSettings {
    pub fn to_hub_config(&self) -> HubConfig {
        HubConfig {
            write_wait: Duration::from_secs(self.write_wait_secs),
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            ping_period: Duration::from_secs(self.ping_period_secs),
            max_message_size: self.max_message_size,
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            outbound_queue: self.outbound_queue.max(1),
        }
    }
}
