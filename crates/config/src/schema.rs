//! Config schema types (broker, chat identity, history replay).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NatterConfig {
    pub broker: BrokerConfig,
    pub chat: ChatConfig,
    pub history: HistoryConfig,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker URL. Defaults to a local NATS server.
    pub url: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".into(),
        }
    }
}

/// Chat identity and startup channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Channel joined at startup.
    pub channel: String,
    /// Display name attached to every published message.
    pub username: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channel: "general".into(),
            username: "anonymous".into(),
        }
    }
}

/// Historical replay bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// How far back a join replays, in seconds.
    pub window_secs: u64,
    /// Wall-clock budget for the history drain, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Upper bound on messages buffered by one replay; exceeding it is an
    /// error, not a truncation.
    pub max_messages: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            fetch_timeout_ms: 2000,
            max_messages: 1024,
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let cfg = NatterConfig::default();
        assert_eq!(cfg.broker.url, "nats://localhost:4222");
        assert_eq!(cfg.chat.channel, "general");
        assert_eq!(cfg.chat.username, "anonymous");
        assert_eq!(cfg.history.window(), Duration::from_secs(3600));
        assert_eq!(cfg.history.fetch_timeout(), Duration::from_millis(2000));
        assert_eq!(cfg.history.max_messages, 1024);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: NatterConfig = toml::from_str(
            r#"
            [chat]
            username = "carol"

            [history]
            fetch_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chat.username, "carol");
        assert_eq!(cfg.chat.channel, "general");
        assert_eq!(cfg.history.fetch_timeout_ms, 500);
        assert_eq!(cfg.history.window_secs, 3600);
    }
}
