use thiserror::Error;

/// Crate-wide result type for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// `send` requires an active channel; publishing with an empty channel
    /// tag would only produce orphaned messages.
    #[error("not joined to any channel")]
    NotJoined,

    /// Gateway errors propagate unmodified; retry policy lives outside the
    /// coordinator.
    #[error(transparent)]
    Broker(#[from] natter_broker::Error),
}
