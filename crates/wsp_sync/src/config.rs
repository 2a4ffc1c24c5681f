//! Engine configuration.

use std::time::Duration;

/// Tunables for one engine instance. Constructed explicitly and passed by
/// reference; nothing here lives in a global.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL, e.g. `https://chat.example.net`.
    pub api_base_url: String,
    /// Poll cadence per actively viewed room.
    pub poll_interval: Duration,
    /// Keep-alive ping cadence on the realtime channel.
    pub heartbeat_interval: Duration,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_cap: Duration,
    /// Give up reconnecting after this many consecutive failures.
    pub reconnect_max_retries: u32,
}

impl Config {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Read the base URL from `WHISPER_API_URL`, falling back to localhost.
    pub fn from_env() -> Self {
        let base = std::env::var("WHISPER_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8090".to_string());
        Self::new(base)
    }

    /// Realtime endpoint derived from the base URL: scheme swapped to
    /// ws(s), path `/api/realtime`.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.api_base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.api_base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{}", self.api_base_url)
        };
        format!("{}/api/realtime", ws_base.trim_end_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8090".to_string(),
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_millis(500),
            reconnect_cap: Duration::from_secs(30),
            reconnect_max_retries: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_swaps_scheme() {
        let cfg = Config::new("https://chat.example.net/");
        assert_eq!(cfg.realtime_url(), "wss://chat.example.net/api/realtime");

        let cfg = Config::new("http://127.0.0.1:8090");
        assert_eq!(cfg.realtime_url(), "ws://127.0.0.1:8090/api/realtime");
    }
}
