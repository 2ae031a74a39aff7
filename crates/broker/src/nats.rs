//! JetStream-backed broker gateway.
//!
//! Publishes through the JetStream context so messages are retained for
//! replay, serves live delivery from a plain core subscription (from-now
//! cursor, at-most-once), and drains history through an ephemeral pull
//! consumer with a start-time cursor.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_nats::jetstream::{
        self,
        consumer::{AckPolicy, DeliverPolicy, PullConsumer, pull},
        stream::{Config as StreamConfig, DiscardPolicy, RetentionPolicy, StorageType},
    },
    async_trait::async_trait,
    futures::StreamExt,
    tokio::{sync::oneshot, time::Instant},
    tracing::{debug, info},
};

use natter_protocol::{ChatMessage, STREAM_NAME, SUBJECT_WILDCARD, channel_subject};

use crate::{
    Error, Result,
    gateway::{Broker, MessageSink},
    history::collect_until,
    subscription::LiveSubscription,
};

/// Gateway over a NATS JetStream broker.
pub struct NatsBroker {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream: jetstream::stream::Stream,
    history_cap: usize,
    closed: AtomicBool,
}

impl NatsBroker {
    /// Connect to the broker at `url` and ensure the chat stream exists.
    ///
    /// `retention` bounds how long the broker keeps messages for replay;
    /// `history_cap` bounds the in-flight buffer of a single history fetch.
    pub async fn connect(url: &str, retention: Duration, history_cap: usize) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| Error::transport("connect", e))?;
        let jetstream = jetstream::new(client.clone());

        let stream = jetstream
            .get_or_create_stream(StreamConfig {
                name: STREAM_NAME.to_string(),
                subjects: vec![SUBJECT_WILDCARD.to_string()],
                retention: RetentionPolicy::Limits,
                storage: StorageType::File,
                discard: DiscardPolicy::Old,
                max_age: retention,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::transport("configure stream", e))?;

        info!(url, stream = STREAM_NAME, "connected to broker");
        Ok(Self {
            client,
            jetstream,
            stream,
            history_cap,
            closed: AtomicBool::new(false),
        })
    }

    async fn drain_consumer(
        &self,
        consumer: &PullConsumer,
        channel: &str,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<Vec<ChatMessage>> {
        let batch = consumer
            .fetch()
            .max_messages(self.history_cap + 1)
            .expires(timeout)
            .messages()
            .await
            .map_err(|e| Error::subscription("history fetch", e))?;

        let channel = channel.to_string();
        let decoded = batch
            .map(move |item| match item {
                Ok(raw) => match serde_json::from_slice::<ChatMessage>(&raw.payload) {
                    Ok(message) => Some(message),
                    Err(error) => {
                        debug!(%error, channel = %channel, "dropping undecodable history payload");
                        None
                    },
                },
                Err(error) => {
                    debug!(%error, channel = %channel, "history batch item failed");
                    None
                },
            })
            .boxed();

        collect_until(decoded, self.history_cap, deadline).await
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, message: &ChatMessage) -> Result<()> {
        let subject = channel_subject(&message.channel)?;
        let payload = serde_json::to_vec(message)?;
        // Fire-and-forget: the ack future is dropped, only the send itself
        // can fail here.
        self.jetstream
            .publish(subject, payload.into())
            .await
            .map_err(|e| Error::transport("publish", e))?;
        Ok(())
    }

    async fn subscribe_live(
        &self,
        channel: &str,
        sink: Arc<dyn MessageSink>,
    ) -> Result<LiveSubscription> {
        let subject = channel_subject(channel)?;
        let mut subscriber = self
            .client
            .subscribe(subject)
            .await
            .map_err(|e| Error::subscription("subscribe", e))?;

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let name = channel.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        if let Err(error) = subscriber.unsubscribe().await {
                            debug!(%error, channel = %name, "unsubscribe failed");
                        }
                        break;
                    },
                    next = subscriber.next() => match next {
                        Some(raw) => match serde_json::from_slice::<ChatMessage>(&raw.payload) {
                            Ok(message) => sink.deliver(message).await,
                            Err(error) => {
                                debug!(%error, channel = %name, "dropping undecodable message");
                            },
                        },
                        // Connection closed underneath us.
                        None => break,
                    },
                }
            }
        });

        debug!(channel, "live subscription armed");
        Ok(LiveSubscription::new(channel, cancel_tx, task))
    }

    async fn fetch_history(
        &self,
        channel: &str,
        window: Duration,
        timeout: Duration,
    ) -> Result<Vec<ChatMessage>> {
        let subject = channel_subject(channel)?;
        let start_time = time::OffsetDateTime::now_utc() - window;
        let deadline = Instant::now() + timeout;

        let consumer = self
            .stream
            .create_consumer(pull::Config {
                deliver_policy: DeliverPolicy::ByStartTime { start_time },
                ack_policy: AckPolicy::None,
                filter_subject: subject,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::subscription("create history consumer", e))?;
        let consumer_name = consumer.cached_info().name.clone();

        let result = self.drain_consumer(&consumer, channel, timeout, deadline).await;

        // The ephemeral consumer is broker-side state; release it whether
        // the drain succeeded, timed out, or overflowed.
        if let Err(error) = self.stream.delete_consumer(&consumer_name).await {
            debug!(%error, consumer = %consumer_name, "failed to delete history consumer");
        }

        match &result {
            Ok(messages) => debug!(channel, count = messages.len(), "history drained"),
            Err(error) => debug!(channel, %error, "history fetch failed"),
        }
        result
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client
            .drain()
            .await
            .map_err(|e| Error::transport("close", e))?;
        info!("broker connection closed");
        Ok(())
    }
}
