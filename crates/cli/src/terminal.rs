use async_trait::async_trait;

use {
    natter_chat::{MessageSink, format_line},
    natter_protocol::ChatMessage,
};

/// Prints each delivered message to stdout. Replayed and live messages
/// render identically, from the message's own timestamp.
pub struct TerminalSink;

#[async_trait]
impl MessageSink for TerminalSink {
    async fn deliver(&self, message: ChatMessage) {
        println!("{}", format_line(&message));
    }
}
