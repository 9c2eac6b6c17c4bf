//! Bounded handoff channel with an idempotent close.
//!
//! Workers share clones of one [`HandoffSender`]; any of them may close it,
//! and only the first close takes effect. Sends check the closed flag first
//! and never wait: a full buffer is reported to the caller instead.

use std::sync::{Arc, Once};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    #[error("handoff channel closed")]
    Closed,
    #[error("handoff channel full")]
    Full,
}

struct CloseGuard {
    closed: CancellationToken,
    once: Once,
}

pub struct HandoffSender<T> {
    tx: mpsc::Sender<T>,
    guard: Arc<CloseGuard>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            guard: self.guard.clone(),
        }
    }
}

pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<T>,
    guard: Arc<CloseGuard>,
}

pub fn channel<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let guard = Arc::new(CloseGuard {
        closed: CancellationToken::new(),
        once: Once::new(),
    });
    (
        HandoffSender {
            tx,
            guard: guard.clone(),
        },
        HandoffReceiver { rx, guard },
    )
}

impl<T> HandoffSender<T> {
    pub fn send(&self, value: T) -> Result<(), HandoffError> {
        if self.guard.closed.is_cancelled() {
            return Err(HandoffError::Closed);
        }
        self.tx.try_send(value).map_err(|e| match e {
            TrySendError::Full(_) => HandoffError::Full,
            TrySendError::Closed(_) => HandoffError::Closed,
        })
    }

    /// Closes the channel. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let mut first = false;
        self.guard.once.call_once(|| {
            self.guard.closed.cancel();
            first = true;
        });
        first
    }

    pub fn is_closed(&self) -> bool {
        self.guard.closed.is_cancelled()
    }
}

impl<T> HandoffReceiver<T> {
    /// Next value, or `None` once the channel is closed and drained (or every
    /// sender is gone).
    pub async fn recv(&mut self) -> Option<T> {
        tokio::select! {
            biased;
            value = self.rx.recv() => value,
            _ = self.guard.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_slot_reports_full() {
        let (tx, mut rx) = channel(1);
        tx.send(1).unwrap();
        assert_eq!(tx.send(2), Err(HandoffError::Full));
        assert_eq!(rx.recv().await, Some(1));
        tx.send(3).unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn close_is_idempotent_across_clones() {
        let (tx, mut rx) = channel::<u8>(1);
        let other = tx.clone();

        assert!(tx.close());
        assert!(!other.close());
        assert!(!tx.close());
        assert!(other.is_closed());
        assert_eq!(other.send(1), Err(HandoffError::Closed));

        // Senders are still alive, but the receiver sees the close.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn buffered_value_survives_close() {
        let (tx, mut rx) = channel(1);
        tx.send("sample").unwrap();
        tx.close();
        assert_eq!(rx.recv().await, Some("sample"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_senders_ends_stream() {
        let (tx, mut rx) = channel::<u8>(1);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
