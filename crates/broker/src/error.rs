use std::error::Error as StdError;

/// Crate-wide result type for broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed broker errors crossing the gateway boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection or network failure. Fatal to the current operation; the
    /// gateway never retries internally.
    #[error("broker transport failed: {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The broker rejected a subscribe or unsubscribe request.
    #[error("broker rejected subscription: {context}: {source}")]
    Subscription {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// Outbound payload could not be encoded. Inbound decode failures are
    /// dropped on the delivery path instead of surfacing here.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Channel name cannot be mapped to a broker subject.
    #[error(transparent)]
    InvalidChannel(#[from] natter_protocol::InvalidChannel),

    /// Historical replay produced more messages than the configured buffer
    /// allows. The fetch fails rather than truncating silently.
    #[error("history replay exceeded the {cap}-message buffer")]
    HistoryOverflow { cap: usize },
}

impl Error {
    #[must_use]
    pub fn transport(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn subscription(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Subscription {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
