//! Hub configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Agora hub server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Outbound queue depth per connection; a full queue drops frames.
    pub outbound_queue_depth: usize,
    /// Ping interval in seconds for idle connection liveness.
    pub ping_interval_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval for periodic system notifications; `0` disables the ticker.
    pub system_tick_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            outbound_queue_depth: 256,
            ping_interval_secs: 30,
            max_message_size: 64 * 1024, // 64 KB
            system_tick_secs: 0,
        }
    }
}

impl HubConfig {
    /// Whether the periodic system-notification ticker is enabled.
    #[must_use]
    pub fn ticker_enabled(&self) -> bool {
        self.system_tick_secs > 0
    }
}
