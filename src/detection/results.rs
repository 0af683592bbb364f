//! Broadcast of the loudness history to observers.

use std::sync::Arc;
use tokio::sync::watch;

use crate::audio::LoudnessValue;

/// Ordered log of every loudness value published so far.
pub type ResultHistory = Vec<LoudnessValue>;

/// Single-writer, multi-reader slot holding the latest [`ResultHistory`].
///
/// Cloning yields another handle to the same slot.
#[derive(Clone)]
pub struct ResultChannel {
    sender: Arc<watch::Sender<ResultHistory>>,
}

impl Default for ResultChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultChannel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ResultHistory::new());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Append `value` to the history and wake every subscriber.
    pub fn publish(&self, value: LoudnessValue) {
        self.sender.send_modify(|history| history.push(value));
    }

    /// Observe the history. The first snapshot seen is the current one, which
    /// is empty until something is published.
    pub fn subscribe(&self) -> ResultSubscriber {
        ResultSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn history(&self) -> ResultHistory {
        self.sender.borrow().clone()
    }

    pub fn latest(&self) -> Option<LoudnessValue> {
        self.sender.borrow().last().copied()
    }
}

/// Read side of a [`ResultChannel`].
pub struct ResultSubscriber {
    receiver: watch::Receiver<ResultHistory>,
}

impl ResultSubscriber {
    /// The history as of the last observed change.
    pub fn snapshot(&mut self) -> ResultHistory {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next publish and return the new history.
    ///
    /// Returns `None` once every channel handle has been dropped.
    pub async fn changed(&mut self) -> Option<ResultHistory> {
        self.receiver.changed().await.ok()?;
        Some(self.snapshot())
    }
}
