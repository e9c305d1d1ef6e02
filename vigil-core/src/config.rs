use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Feed client settings. Defaults match the dashboard backend running
/// locally on port 8000.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// WebSocket endpoint pushing alert frames.
    pub ws_url: String,
    /// Base URL for the subscription REST API.
    pub api_url: String,
    /// Flat delay before retrying a dropped connection.
    pub reconnect_delay_secs: u64,
    /// Optional cap on the number of alerts held; `None` keeps everything.
    pub max_feed_len: Option<usize>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws".to_string(),
            api_url: "http://localhost:8000".to_string(),
            reconnect_delay_secs: 3,
            max_feed_len: None,
        }
    }
}

impl FeedConfig {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::default();

        // Load from environment variables
        if let Ok(ws_url) = env::var("VIGIL_WS_URL") {
            config.ws_url = ws_url;
        }

        if let Ok(api_url) = env::var("VIGIL_API_URL") {
            config.api_url = api_url;
        }

        if let Ok(delay) = env::var("VIGIL_RECONNECT_DELAY_SECS") {
            config.reconnect_delay_secs = delay.parse()?;
        }

        if let Ok(max_len) = env::var("VIGIL_MAX_FEED_LEN") {
            config.max_feed_len = Some(max_len.parse()?);
        }

        Ok(config)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
