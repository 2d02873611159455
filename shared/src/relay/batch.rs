//! Outbound batching: a batch closes at `max_size` messages or `max_wait`
//! after its first message, whichever comes first.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub max_size: usize,
    pub max_wait: Duration,
}

/// Wait for the next batch. `None` once the channel is closed or on
/// cancellation before a first message arrives.
pub async fn next_batch<T>(
    rx: &mut mpsc::Receiver<T>,
    policy: BatchPolicy,
    cancel: &CancellationToken,
) -> Option<Vec<T>> {
    let first = tokio::select! {
        _ = cancel.cancelled() => return None,
        first = rx.recv() => first?,
    };

    let max_size = policy.max_size.max(1);
    let mut batch = Vec::with_capacity(max_size.min(64));
    batch.push(first);

    let deadline = tokio::time::Instant::now() + policy.max_wait;
    while batch.len() < max_size {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => break,
            next = rx.recv() => match next {
                Some(item) => batch.push(item),
                None => break,
            },
        }
    }
    Some(batch)
}
