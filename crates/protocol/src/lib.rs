//! Wire protocol shared by the broker gateway and the chat coordinator.
//!
//! Messages cross the broker as JSON records with fixed field names
//! (`content`, `sender`, `channel`, `timestamp`); timestamps are RFC 3339.
//! Each channel maps to one broker subject under the `chat.` prefix.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// ── Subject namespace ────────────────────────────────────────────────────────

/// JetStream stream holding all chat subjects.
pub const STREAM_NAME: &str = "CHAT";

/// Subject prefix for channel subjects.
pub const SUBJECT_PREFIX: &str = "chat";

/// Wildcard bound to [`STREAM_NAME`], covering every channel.
pub const SUBJECT_WILDCARD: &str = "chat.*";

/// A channel name that cannot be mapped to a broker subject.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid channel name: {name:?}")]
pub struct InvalidChannel {
    pub name: String,
}

/// Map a channel name to its broker subject.
///
/// Channel names become one subject token, so NATS token syntax applies:
/// non-empty, no `.`, `*`, `>`, whitespace, or control characters.
pub fn channel_subject(channel: &str) -> Result<String, InvalidChannel> {
    validate_channel(channel)?;
    Ok(format!("{SUBJECT_PREFIX}.{channel}"))
}

/// Validate a channel name against subject token rules.
pub fn validate_channel(channel: &str) -> Result<(), InvalidChannel> {
    let ok = !channel.is_empty()
        && !channel
            .chars()
            .any(|c| matches!(c, '.' | '*' | '>') || c.is_whitespace() || c.is_control());
    if ok {
        Ok(())
    } else {
        Err(InvalidChannel {
            name: channel.to_string(),
        })
    }
}

// ── Message ──────────────────────────────────────────────────────────────────

/// A single chat message. Immutable once constructed; both the publish path
/// and the receive path use this exact shape on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub sender: String,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build an outgoing message stamped with the current wall clock.
    #[must_use]
    pub fn outgoing(
        content: impl Into<String>,
        sender: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            sender: sender.into(),
            channel: channel.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, chrono::TimeZone};

    fn sample() -> ChatMessage {
        ChatMessage {
            content: "hi".into(),
            sender: "bob".into(),
            channel: "general".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 12).unwrap(),
        }
    }

    #[test]
    fn round_trips_all_fields() {
        let msg = sample();
        let raw = serde_json::to_vec(&msg).unwrap();
        let back: ChatMessage = serde_json::from_slice(&raw).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn wire_field_names_are_stable() {
        let value = serde_json::to_value(sample()).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["channel", "content", "sender", "timestamp"]);
    }

    #[test]
    fn decodes_rfc3339_payload() {
        let raw = r#"{"content":"hello","sender":"ana","channel":"dev","timestamp":"2024-05-17T09:30:12.5Z"}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.sender, "ana");
        assert_eq!(msg.timestamp.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn channel_subject_mapping() {
        assert_eq!(channel_subject("general").unwrap(), "chat.general");
    }

    #[test]
    fn rejects_bad_channel_names() {
        for name in ["", "a.b", "a b", "star*", "gt>", "tab\tname"] {
            assert!(validate_channel(name).is_err(), "accepted {name:?}");
        }
        assert!(validate_channel("team-42_x").is_ok());
    }
}
