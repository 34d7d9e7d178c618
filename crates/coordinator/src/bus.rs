//! Per-context mailboxes. Delivery is at-most-once and best-effort: a full or
//! closed mailbox drops the message instead of blocking the sender.

use tokio::sync::mpsc::{self, error::TrySendError};

pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

pub struct Mailbox<T> {
    context: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context,
            tx: self.tx.clone(),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn channel(context: &'static str, capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { context, tx }, rx)
    }

    pub fn context(&self) -> &'static str {
        self.context
    }

    /// Returns whether the message was accepted by the mailbox.
    pub fn post(&self, message: T) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => {
                tracing::trace!(context = self.context, "message posted");
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(context = self.context, "mailbox full; message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(context = self.context, "mailbox closed; message dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
