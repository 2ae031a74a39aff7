//! In-process broker for tests and non-transport contexts.
//!
//! Keeps the full published backlog for history fetches and fans live
//! messages out over broadcast channels. Raw-payload injection and
//! fail-next knobs let tests drive the error and corrupt-payload paths.

use std::{collections::HashMap, io, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    bytes::Bytes,
    chrono::{DateTime, Utc},
    tokio::sync::{Mutex, broadcast, oneshot},
    tracing::debug,
};

use natter_protocol::{ChatMessage, channel_subject};

use crate::{
    Error, Result,
    gateway::{Broker, MessageSink},
    subscription::LiveSubscription,
};

const TOPIC_CAPACITY: usize = 64;

struct Record {
    channel: String,
    received_at: DateTime<Utc>,
    payload: Bytes,
}

#[derive(Default)]
struct State {
    backlog: Vec<Record>,
    topics: HashMap<String, broadcast::Sender<Bytes>>,
    fail_publish: bool,
    fail_subscribe: bool,
    fail_fetch: bool,
    closed: bool,
}

/// In-process [`Broker`] implementation.
pub struct MemoryBroker {
    state: Mutex<State>,
    history_cap: usize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            history_cap: 1024,
        }
    }

    #[must_use]
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    /// Fail the next `publish` call with a transport error.
    pub async fn fail_next_publish(&self) {
        self.state.lock().await.fail_publish = true;
    }

    /// Fail the next `subscribe_live` call with a subscription error.
    pub async fn fail_next_subscribe(&self) {
        self.state.lock().await.fail_subscribe = true;
    }

    /// Fail the next `fetch_history` call with a transport error.
    pub async fn fail_next_fetch(&self) {
        self.state.lock().await.fail_fetch = true;
    }

    /// Inject a raw payload as if it had been published at `received_at`.
    /// The payload is recorded in the backlog and fanned out live, whether
    /// or not it decodes.
    pub async fn publish_raw(
        &self,
        channel: &str,
        payload: impl Into<Bytes>,
        received_at: DateTime<Utc>,
    ) {
        let payload = payload.into();
        let mut state = self.state.lock().await;
        if let Some(sender) = state.topics.get(channel) {
            let _ = sender.send(payload.clone());
        }
        state.backlog.push(Record {
            channel: channel.to_string(),
            received_at,
            payload,
        });
    }

    /// Number of live subscriptions currently attached to `channel`.
    pub async fn live_subscriber_count(&self, channel: &str) -> usize {
        let state = self.state.lock().await;
        state
            .topics
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn injected(context: &str) -> Error {
        Error::transport(
            context,
            io::Error::new(io::ErrorKind::BrokenPipe, "injected failure"),
        )
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, message: &ChatMessage) -> Result<()> {
        channel_subject(&message.channel)?;
        let payload = Bytes::from(serde_json::to_vec(message)?);
        let mut state = self.state.lock().await;
        if std::mem::take(&mut state.fail_publish) {
            return Err(Self::injected("publish"));
        }
        if state.closed {
            return Err(Self::injected("publish on closed broker"));
        }
        if let Some(sender) = state.topics.get(&message.channel) {
            // Fire-and-forget: nobody listening is not an error.
            let _ = sender.send(payload.clone());
        }
        state.backlog.push(Record {
            channel: message.channel.clone(),
            received_at: Utc::now(),
            payload,
        });
        Ok(())
    }

    async fn subscribe_live(
        &self,
        channel: &str,
        sink: Arc<dyn MessageSink>,
    ) -> Result<LiveSubscription> {
        channel_subject(channel)?;
        let mut receiver = {
            let mut state = self.state.lock().await;
            if std::mem::take(&mut state.fail_subscribe) {
                return Err(Error::subscription(
                    "subscribe",
                    io::Error::new(io::ErrorKind::BrokenPipe, "injected failure"),
                ));
            }
            if state.closed {
                return Err(Self::injected("subscribe on closed broker"));
            }
            state
                .topics
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
                .subscribe()
        };

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let name = channel.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    recv = receiver.recv() => match recv {
                        Ok(payload) => match serde_json::from_slice::<ChatMessage>(&payload) {
                            Ok(message) => sink.deliver(message).await,
                            Err(error) => {
                                debug!(%error, channel = %name, "dropping undecodable message");
                            },
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, channel = %name, "live delivery lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(LiveSubscription::new(channel, cancel_tx, task))
    }

    async fn fetch_history(
        &self,
        channel: &str,
        window: Duration,
        // The in-process backlog never stalls; the timeout only matters for
        // real transports.
        _timeout: Duration,
    ) -> Result<Vec<ChatMessage>> {
        channel_subject(channel)?;
        let cutoff = Utc::now() - window;
        let mut state = self.state.lock().await;
        if std::mem::take(&mut state.fail_fetch) {
            return Err(Self::injected("fetch history"));
        }
        if state.closed {
            return Err(Self::injected("fetch on closed broker"));
        }
        let mut messages = Vec::new();
        for record in &state.backlog {
            if record.channel != channel || record.received_at < cutoff {
                continue;
            }
            match serde_json::from_slice::<ChatMessage>(&record.payload) {
                Ok(message) => {
                    if messages.len() == self.history_cap {
                        return Err(Error::HistoryOverflow {
                            cap: self.history_cap,
                        });
                    }
                    messages.push(message);
                },
                Err(error) => {
                    debug!(%error, channel, "dropping undecodable history payload");
                },
            }
        }
        Ok(messages)
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        // Dropping the senders wakes every live delivery task with Closed.
        state.topics.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    struct ChannelSink(mpsc::UnboundedSender<ChatMessage>);

    #[async_trait]
    impl MessageSink for ChannelSink {
        async fn deliver(&self, message: ChatMessage) {
            let _ = self.0.send(message);
        }
    }

    fn sink() -> (Arc<ChannelSink>, mpsc::UnboundedReceiver<ChatMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelSink(tx)), rx)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<ChatMessage>) -> ChatMessage {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("sink channel closed")
    }

    #[tokio::test]
    async fn live_delivery_starts_at_subscription_time() {
        let broker = MemoryBroker::new();
        broker
            .publish(&ChatMessage::outgoing("before", "ana", "general"))
            .await
            .unwrap();

        let (sink, mut rx) = sink();
        let sub = broker.subscribe_live("general", sink).await.unwrap();
        broker
            .publish(&ChatMessage::outgoing("after", "ana", "general"))
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await.content, "after");
        assert!(rx.try_recv().is_err(), "pre-subscription message leaked");
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn corrupt_payload_does_not_kill_the_subscription() {
        let broker = MemoryBroker::new();
        let (sink, mut rx) = sink();
        let sub = broker.subscribe_live("general", sink).await.unwrap();

        broker
            .publish_raw("general", &b"not json"[..], Utc::now())
            .await;
        broker
            .publish(&ChatMessage::outgoing("still alive", "ana", "general"))
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await.content, "still alive");
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn history_is_scoped_to_channel_and_window() {
        let broker = MemoryBroker::new();
        broker
            .publish(&ChatMessage::outgoing("ours", "ana", "general"))
            .await
            .unwrap();
        broker
            .publish(&ChatMessage::outgoing("theirs", "ana", "dev"))
            .await
            .unwrap();
        let stale = ChatMessage::outgoing("stale", "ana", "general");
        broker
            .publish_raw(
                "general",
                serde_json::to_vec(&stale).unwrap(),
                Utc::now() - Duration::from_secs(7200),
            )
            .await;

        let messages = broker
            .fetch_history("general", Duration::from_secs(3600), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "ours");
    }

    #[tokio::test]
    async fn history_overflow_is_loud() {
        let broker = MemoryBroker::new().with_history_cap(2);
        for n in 0..3 {
            broker
                .publish(&ChatMessage::outgoing(format!("m{n}"), "ana", "general"))
                .await
                .unwrap();
        }
        let err = broker
            .fetch_history("general", Duration::from_secs(3600), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HistoryOverflow { cap: 2 }));
    }

    #[tokio::test]
    async fn unsubscribe_detaches_the_delivery_task() {
        let broker = MemoryBroker::new();
        let (sink, _rx) = sink();
        let sub = broker.subscribe_live("general", sink).await.unwrap();
        assert_eq!(broker.live_subscriber_count("general").await, 1);
        sub.unsubscribe().await;
        assert_eq!(broker.live_subscriber_count("general").await, 0);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_operations() {
        let broker = MemoryBroker::new();
        broker.close().await.unwrap();
        broker.close().await.unwrap();
        let err = broker
            .publish(&ChatMessage::outgoing("late", "ana", "general"))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn rejects_invalid_channel_names() {
        let broker = MemoryBroker::new();
        let err = broker
            .fetch_history("a.b", Duration::from_secs(1), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidChannel(_)));
    }
}

