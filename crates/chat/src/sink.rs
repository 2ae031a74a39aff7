use std::sync::Mutex;

use async_trait::async_trait;

use {natter_broker::MessageSink, natter_protocol::ChatMessage};

/// Render a message as `[HH:MM:SS] sender: content`, using the message's
/// own timestamp (UTC).
#[must_use]
pub fn format_line(message: &ChatMessage) -> String {
    format!(
        "[{}] {}: {}",
        message.timestamp.format("%H:%M:%S"),
        message.sender,
        message.content
    )
}

/// Sink that records every delivered message. For tests.
#[derive(Default)]
pub struct VecSink {
    messages: Mutex<Vec<ChatMessage>>,
}

impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far, in delivery order.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl MessageSink for VecSink {
    async fn deliver(&self, message: ChatMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn formats_with_message_own_timestamp() {
        let message = ChatMessage {
            content: "hello there".into(),
            sender: "bob".into(),
            channel: "general".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 17, 9, 5, 3).unwrap(),
        };
        assert_eq!(format_line(&message), "[09:05:03] bob: hello there");
    }

    #[tokio::test]
    async fn vec_sink_records_in_delivery_order() {
        let sink = VecSink::new();
        sink.deliver(ChatMessage::outgoing("a", "x", "c")).await;
        sink.deliver(ChatMessage::outgoing("b", "x", "c")).await;
        let contents: Vec<_> = sink.messages().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, ["a", "b"]);
    }
}
