use std::{sync::Arc, time::Duration};

use {
    tokio::sync::Mutex,
    tracing::{debug, info},
};

use {
    natter_broker::{Broker, LiveSubscription, MessageSink},
    natter_protocol::ChatMessage,
};

use crate::{Error, Result};

/// Content of the sentinel message published when leaving a channel.
const LEAVE_NOTICE: &str = "has left the channel";

/// Replay bounds applied when joining a channel.
#[derive(Debug, Clone, Copy)]
pub struct ReplaySettings {
    /// How far back to fetch history.
    pub window: Duration,
    /// Wall-clock budget for the history drain.
    pub fetch_timeout: Duration,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(2),
        }
    }
}

enum ChannelState {
    Idle,
    Active {
        channel: String,
        live: LiveSubscription,
    },
}

/// Coordinates channel membership for one user session.
///
/// Owns the join/leave state machine: at most one channel is active, and a
/// join sequences the bounded historical replay before arming the live
/// subscription, so replayed and live messages flow through the same sink.
///
/// `join`, `leave`, and `send` are serialized against each other; live
/// delivery runs concurrently on the gateway's tasks and never takes the
/// session lock.
pub struct ChatSession {
    broker: Arc<dyn Broker>,
    sink: Arc<dyn MessageSink>,
    username: String,
    replay: ReplaySettings,
    state: Mutex<ChannelState>,
}

impl ChatSession {
    /// The sink is fixed at construction; every replayed and live message
    /// of every joined channel is delivered to it.
    pub fn new(
        broker: Arc<dyn Broker>,
        sink: Arc<dyn MessageSink>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            sink,
            username: username.into(),
            replay: ReplaySettings::default(),
            state: Mutex::new(ChannelState::Idle),
        }
    }

    #[must_use]
    pub fn with_replay(mut self, replay: ReplaySettings) -> Self {
        self.replay = replay;
        self
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Channel currently joined, if any.
    pub async fn active_channel(&self) -> Option<String> {
        match &*self.state.lock().await {
            ChannelState::Idle => None,
            ChannelState::Active { channel, .. } => Some(channel.clone()),
        }
    }

    /// Join `channel`: drain its recent history, replay it through the sink
    /// in timestamp order, then arm the live subscription.
    ///
    /// If any step fails the session is left idle — a channel is never
    /// considered joined when its history could not be retrieved. Joining
    /// while already active releases the previous subscription first (no
    /// sentinel is published for that implicit leave).
    ///
    /// Messages published between the end of the history capture and the
    /// moment the live cursor starts can be missed, or seen twice if the
    /// cursors overlap. The seam is inherent to the two-cursor broker model
    /// and is documented rather than hidden.
    pub async fn join(&self, channel: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let ChannelState::Active {
            channel: previous,
            live,
        } = std::mem::replace(&mut *state, ChannelState::Idle)
        {
            debug!(from = %previous, to = channel, "releasing subscription before rejoin");
            live.unsubscribe().await;
        }

        let mut history = self
            .broker
            .fetch_history(channel, self.replay.window, self.replay.fetch_timeout)
            .await?;
        // The drain carries no order guarantee; replay order comes from the
        // messages' own timestamps. Stable, so equal stamps keep arrival order.
        history.sort_by_key(|message| message.timestamp);
        let replayed = history.len();
        for message in history {
            self.sink.deliver(message).await;
        }

        let live = self
            .broker
            .subscribe_live(channel, Arc::clone(&self.sink))
            .await?;
        *state = ChannelState::Active {
            channel: channel.to_string(),
            live,
        };
        info!(channel, replayed, "joined channel");
        Ok(())
    }

    /// Publish `content` to the active channel as this session's user.
    pub async fn send(&self, content: &str) -> Result<()> {
        let state = self.state.lock().await;
        let ChannelState::Active { channel, .. } = &*state else {
            return Err(Error::NotJoined);
        };
        let message = ChatMessage::outgoing(content, self.username.as_str(), channel.as_str());
        self.broker.publish(&message).await?;
        Ok(())
    }

    /// Leave the active channel: announce the departure with a sentinel
    /// message, release the live subscription, and return to idle.
    ///
    /// A no-op when no channel is active. The subscription is released and
    /// the session goes idle even when the sentinel publish fails; only the
    /// publish error is reported.
    pub async fn leave(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let ChannelState::Active { channel, live } =
            std::mem::replace(&mut *state, ChannelState::Idle)
        else {
            return Ok(());
        };

        let sentinel = ChatMessage::outgoing(LEAVE_NOTICE, self.username.as_str(), channel.as_str());
        let published = self.broker.publish(&sentinel).await;
        live.unsubscribe().await;
        info!(channel = %channel, "left channel");
        published.map_err(Error::from)
    }
}
