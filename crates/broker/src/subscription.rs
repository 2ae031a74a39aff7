use {
    tokio::{sync::oneshot, task::JoinHandle},
    tracing::debug,
};

/// Scoped handle to a live channel subscription.
///
/// Owning the handle keeps the delivery task alive. [`unsubscribe`]
/// releases broker-side state and waits for the task to wind down;
/// dropping the handle without unsubscribing aborts the task as a
/// fallback so a forgotten handle cannot leak delivery work.
///
/// [`unsubscribe`]: LiveSubscription::unsubscribe
pub struct LiveSubscription {
    channel: String,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl LiveSubscription {
    /// Assemble a handle from a cancel signal and the delivery task that
    /// listens for it. The task is expected to release broker-side state
    /// when the signal fires, then exit.
    #[must_use]
    pub fn new(channel: impl Into<String>, cancel: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            channel: channel.into(),
            cancel: Some(cancel),
            task,
        }
    }

    /// Channel this subscription delivers for.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Release the subscription and wait for delivery to stop.
    pub async fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(error) = (&mut self.task).await {
            if error.is_panic() {
                debug!(channel = %self.channel, %error, "delivery task panicked");
            }
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
