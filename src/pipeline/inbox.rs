//! Unified inbox: the single queue every producer feeds.
//!
//! FIFO across all sources, unbounded, multi-producer/single-consumer.
//! Enqueueing never blocks. The worker's blocking dequeue is its only wait
//! point while idle.

use crate::pipeline::messages::AssistantMessage;
use crossbeam_channel::{Receiver, Sender};

/// The inbox was dropped; the message could not be queued.
#[derive(Debug, thiserror::Error)]
#[error("inbox closed")]
pub struct InboxClosed(pub Box<AssistantMessage>);

/// Producer side of the inbox. Clone one per producer thread.
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: Sender<AssistantMessage>,
}

impl InboxSender {
    /// Enqueue a message.
    ///
    /// # Errors
    ///
    /// Returns [`InboxClosed`] when the worker side has been dropped.
    pub fn send(&self, message: AssistantMessage) -> Result<(), InboxClosed> {
        let source = message.source();
        self.tx
            .send(message)
            .map_err(|e| InboxClosed(Box::new(e.into_inner())))?;
        tracing::debug!(%source, pending = self.tx.len(), "message enqueued");
        Ok(())
    }
}

/// Result of waiting on the inbox.
#[derive(Debug)]
pub enum Received {
    /// The next message in enqueue order.
    Message(AssistantMessage),
    /// A shutdown was requested.
    Shutdown,
    /// Every producer has gone away.
    Disconnected,
}

/// Consumer side of the inbox. Owned by the worker.
#[derive(Debug)]
pub struct Inbox {
    rx: Receiver<AssistantMessage>,
}

/// Create a connected inbox pair.
#[must_use]
pub fn channel() -> (InboxSender, Inbox) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (InboxSender { tx }, Inbox { rx })
}

impl Inbox {
    /// Block until the next message arrives. `None` once every sender is gone
    /// and the queue is drained.
    pub fn recv(&self) -> Option<AssistantMessage> {
        self.rx.recv().ok()
    }

    /// Block until the next message arrives or shutdown is signalled.
    ///
    /// A queued message and a pending shutdown are raced fairly; the caller
    /// stops either way once shutdown is observed.
    pub fn recv_or_shutdown(&self, shutdown: &ShutdownListener) -> Received {
        crossbeam_channel::select! {
            recv(self.rx) -> msg => match msg {
                Ok(message) => Received::Message(message),
                Err(_) => Received::Disconnected,
            },
            recv(shutdown.rx) -> _ => Received::Shutdown,
        }
    }

    /// Messages waiting to be processed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Requests worker shutdown. Dropping every trigger also counts as a request.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Sender<()>,
}

impl ShutdownTrigger {
    /// Ask the worker to stop after its current message.
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Worker side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownListener {
    rx: Receiver<()>,
}

impl ShutdownListener {
    /// A listener that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self {
            rx: crossbeam_channel::never(),
        }
    }
}

/// Create a connected shutdown pair.
#[must_use]
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownListener) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (ShutdownTrigger { tx }, ShutdownListener { rx })
}
