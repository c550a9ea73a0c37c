//! Notification channel for replication errors, warnings and sync signals.
//!
//! Notifications are published on a broadcast channel; subscribers consume
//! them on their own tasks, so publishing never runs a handler inline.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::broadcast;

use super::event::{Direction, ReplicationFault};

/// Buffered notifications per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 64;

/// Fatal replication conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("Replication {direction} denied: {fault}")]
    Denied {
        direction: Direction,
        fault: ReplicationFault,
    },

    #[error("Replication {direction} failed: {fault}")]
    Transport {
        direction: Direction,
        fault: ReplicationFault,
    },

    #[error("Error in {direction} replication: {detail}")]
    Change { direction: Direction, detail: String },

    #[error("Document error during {direction}: {fault}")]
    Document {
        direction: Direction,
        fault: ReplicationFault,
    },

    #[error("Document write failures during {direction}: {failures}")]
    WriteFailures { direction: Direction, failures: u64 },

    #[error("Unknown {direction} error: {detail}")]
    NotOk { direction: Direction, detail: String },
}

/// A recoverable remote problem: a design document does not compile there.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Design document compile error during {direction}: {fault}")]
pub struct CompileWarning {
    pub direction: Direction,
    pub fault: ReplicationFault,
}

/// Events published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Needs caller attention.
    Error(ReplicationError),
    /// Recoverable; replication continues.
    Warn(CompileWarning),
    /// Both directions paused. Heuristic, not proof the replicas are equal.
    Sync,
}

/// Publishes notifications to any number of subscribers.
///
/// The receiver created with the channel is kept until the first
/// `subscribe()`, so the first subscriber also sees whatever was published
/// before it subscribed (up to the channel capacity). Later subscribers only
/// see what is published after they subscribe.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
    first: Arc<Mutex<Option<broadcast::Receiver<Notification>>>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, first) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            first: Arc::new(Mutex::new(Some(first))),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        let first = self.first.lock().unwrap_or_else(|e| e.into_inner()).take();
        first.unwrap_or_else(|| self.sender.subscribe())
    }

    /// Publishes immediately.
    pub fn notify(&self, notification: Notification) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(notification);
    }

    /// Yields to the scheduler once, then publishes.
    ///
    /// Used for errors raised while a stream event is still being handled.
    pub async fn notify_deferred(&self, notification: Notification) {
        tokio::task::yield_now().await;
        self.notify(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
