use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle for cancelling a translation stream when the client disconnects
#[derive(Clone)]
pub struct StreamCancelHandle {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
    /// Set once the terminal marker went out, so a late drop is not a disconnect
    completed: Arc<AtomicBool>,
}

impl StreamCancelHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the stream as completed normally.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation (only if not already completed).
    ///
    /// Returns true when this call actually cancelled the stream.
    pub fn cancel(&self) -> bool {
        if self.is_completed() || self.is_cancelled() {
            return false;
        }
        self.sender.send(true).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Get a receiver for use in select!
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }

    /// Resolve once cancellation has been signalled.
    ///
    /// Never resolves if the stream completes first.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for StreamCancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
