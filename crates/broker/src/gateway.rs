use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use natter_protocol::ChatMessage;

use crate::{Result, subscription::LiveSubscription};

/// Receives messages delivered by the gateway. Replayed and live messages
/// arrive through the same sink and are indistinguishable to it.
///
/// `deliver` runs on the gateway's delivery task; implementations must
/// return promptly or they back up live delivery for their subscription.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: ChatMessage);
}

/// Narrow contract over the external publish/subscribe broker.
///
/// The replay cursor (start-from-timestamp) and the live cursor
/// (start-from-now) are mutually exclusive subscription modes, which is why
/// history and live delivery are separate operations: callers sequence a
/// bounded [`fetch_history`](Broker::fetch_history) before arming
/// [`subscribe_live`](Broker::subscribe_live).
#[async_trait]
pub trait Broker: Send + Sync {
    /// Serialize `message` and send it to the subject derived from
    /// `message.channel`. Fire-and-forget: no delivery acknowledgment is
    /// awaited, but the call itself fails synchronously on a dead
    /// connection or an encode failure.
    async fn publish(&self, message: &ChatMessage) -> Result<()>;

    /// Deliver every message published to `channel` from this moment on,
    /// at-most-once (no acknowledgment round-trip; broker-buffered
    /// redelivery after a reconnect is out of scope). Messages published
    /// before the subscription are never delivered through this path.
    ///
    /// Malformed payloads are logged and dropped; a corrupt message never
    /// terminates the subscription.
    async fn subscribe_live(
        &self,
        channel: &str,
        sink: Arc<dyn MessageSink>,
    ) -> Result<LiveSubscription>;

    /// Best-effort, time-boxed drain of messages published to `channel`
    /// within `window` before now. Returns on end-of-backlog or when
    /// `timeout` elapses, whichever comes first; under a slow broker the
    /// result may be a silent partial. No delivery order is guaranteed —
    /// callers sort. The temporary broker-side consumer is released on
    /// every exit path.
    async fn fetch_history(
        &self,
        channel: &str,
        window: Duration,
        timeout: Duration,
    ) -> Result<Vec<ChatMessage>>;

    /// Release the connection. Idempotent; pending operations fail fast
    /// once the connection is gone.
    async fn close(&self) -> Result<()>;
}
