//! Bounded collection for historical replay.
//!
//! The drain races the broker's backlog against a monotonic deadline, so a
//! stalled broker can never hold the caller past the configured timeout.

use {
    futures::{Stream, StreamExt},
    tokio::time::Instant,
};

use natter_protocol::ChatMessage;

use crate::{Error, Result};

/// Collect decoded messages from `messages` until the stream ends or
/// `deadline` passes, whichever comes first.
///
/// `None` items mark payloads the caller already rejected (undecodable);
/// they are skipped without counting against `cap`. Exceeding `cap`
/// decodable messages aborts with [`Error::HistoryOverflow`].
pub(crate) async fn collect_until<S>(
    mut messages: S,
    cap: usize,
    deadline: Instant,
) -> Result<Vec<ChatMessage>>
where
    S: Stream<Item = Option<ChatMessage>> + Unpin,
{
    let mut collected = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, messages.next()).await {
            // Deadline hit: return what was drained so far.
            Err(_) => break,
            // End of backlog.
            Ok(None) => break,
            // Undecodable payload, already logged by the caller.
            Ok(Some(None)) => {},
            Ok(Some(Some(message))) => {
                if collected.len() == cap {
                    return Err(Error::HistoryOverflow { cap });
                }
                collected.push(message);
            },
        }
    }
    Ok(collected)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {futures::stream, std::time::Duration};

    use super::*;

    fn msg(n: u8) -> ChatMessage {
        ChatMessage::outgoing(format!("m{n}"), "t", "general")
    }

    #[tokio::test]
    async fn drains_finite_backlog_before_deadline() {
        let items = stream::iter(vec![Some(msg(1)), None, Some(msg(2))]);
        let deadline = Instant::now() + Duration::from_secs(2);
        let out = collect_until(items, 16, deadline).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "m1");
        assert_eq!(out[1].content, "m2");
    }

    #[tokio::test(start_paused = true)]
    async fn returns_at_deadline_when_backlog_never_ends() {
        let started = Instant::now();
        let items = stream::pending::<Option<ChatMessage>>();
        let deadline = started + Duration::from_secs(2);
        let out = collect_until(items, 16, deadline).await.unwrap();
        assert!(out.is_empty());
        // Paused clock: the timer fired exactly at the deadline, not later.
        assert_eq!(Instant::now(), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_drain_when_stream_stalls_midway() {
        let head = stream::iter(vec![Some(msg(1)), Some(msg(2))]);
        let items = head.chain(stream::pending());
        let deadline = Instant::now() + Duration::from_millis(200);
        let out = collect_until(items, 16, deadline).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn overflow_fails_loudly() {
        let items = stream::iter((0..5).map(|n| Some(msg(n))).collect::<Vec<_>>());
        let deadline = Instant::now() + Duration::from_secs(2);
        let err = collect_until(items, 4, deadline).await.unwrap_err();
        assert!(matches!(err, Error::HistoryOverflow { cap: 4 }));
    }

    #[tokio::test]
    async fn skipped_payloads_do_not_count_against_cap() {
        let items = stream::iter(vec![None, Some(msg(1)), None, Some(msg(2))]);
        let deadline = Instant::now() + Duration::from_secs(2);
        let out = collect_until(items, 2, deadline).await.unwrap();
        assert_eq!(out.len(), 2);
    }
}
