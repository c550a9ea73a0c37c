//! The replication stream contract.
//!
//! A [`Replicator`] starts one continuous stream per direction and hands
//! back a [`StreamHandle`]: a receiver of [`ReplicationEvent`]s plus an
//! optional canceller. Streams that cannot be cancelled simply omit it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::filter::Filter;
use crate::document::DESIGN_PREFIX;

/// Default number of documents per replication batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Fault names a remote uses when a design document fails to compile.
const COMPILE_FAULTS: [&str; 2] = ["compilation_error", "invalid_design_doc"];

/// Which way documents flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Remote to local.
    Pull,
    /// Local to remote.
    Push,
}

impl Direction {
    pub(crate) fn index(self) -> usize {
        match self {
            Direction::Pull => 0,
            Direction::Push => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Pull => write!(f, "pull"),
            Direction::Push => write!(f, "push"),
        }
    }
}

/// An error reported by a replication stream.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {reason}")]
pub struct ReplicationFault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub name: String,
    pub reason: String,
    /// Document the fault concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ReplicationFault {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: None,
            name: name.into(),
            reason: reason.into(),
            id: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns true if the fault says a design document does not compile on
    /// the remote. Replication carries on past these.
    pub fn is_design_compile_error(&self) -> bool {
        if COMPILE_FAULTS.contains(&self.name.as_str()) {
            return true;
        }
        let on_design_doc = self
            .id
            .as_deref()
            .is_some_and(|id| id.starts_with(DESIGN_PREFIX));
        on_design_doc && self.reason.to_lowercase().contains("compil")
    }
}

/// Counters carried by `change` and `complete` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationInfo {
    pub ok: bool,
    pub docs_read: u64,
    pub docs_written: u64,
    pub doc_write_failures: u64,
    pub errors: Vec<ReplicationFault>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl ReplicationInfo {
    /// Empty counters for a stream starting now.
    pub fn started() -> Self {
        Self {
            ok: true,
            docs_read: 0,
            docs_written: 0,
            doc_write_failures: 0,
            errors: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Marks the counters as final.
    pub fn finish(mut self) -> Self {
        self.end_time = Some(Utc::now());
        self
    }
}

/// Events emitted by a replication stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    /// The stream started (or resumed) moving changes.
    Active,
    /// The stream caught up and is waiting, possibly after a retryable fault.
    Paused(Option<ReplicationFault>),
    /// The remote refused a document or the session.
    Denied(ReplicationFault),
    Error(ReplicationFault),
    /// A batch of changes was replicated.
    Change(ReplicationInfo),
    /// The stream finished. Completion does not imply success.
    Complete(ReplicationInfo),
}

/// Options a replicator passes to the underlying stream.
#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    pub batch_size: usize,
    /// Keep following the changes feed after catching up.
    pub live: bool,
    /// Retry after transport failures instead of stopping.
    pub retry: bool,
    /// Per-operation timeout.
    pub timeout: Option<Duration>,
    pub filter: Filter,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            live: true,
            retry: true,
            timeout: None,
            filter: Filter::default(),
        }
    }
}

/// Stops a stream. Called at most once.
pub type Canceller = Box<dyn FnOnce() + Send>;

/// A running replication stream.
pub struct StreamHandle {
    events: mpsc::UnboundedReceiver<ReplicationEvent>,
    canceller: Option<Canceller>,
}

impl StreamHandle {
    pub fn new(events: mpsc::UnboundedReceiver<ReplicationEvent>) -> Self {
        Self {
            events,
            canceller: None,
        }
    }

    /// Creates a handle together with the sender that feeds it.
    pub fn channel() -> (mpsc::UnboundedSender<ReplicationEvent>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self::new(receiver))
    }

    pub fn with_canceller<F>(mut self, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.canceller = Some(Box::new(cancel));
        self
    }

    pub fn can_cancel(&self) -> bool {
        self.canceller.is_some()
    }

    pub(crate) fn into_parts(self) -> (mpsc::UnboundedReceiver<ReplicationEvent>, Option<Canceller>) {
        (self.events, self.canceller)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("can_cancel", &self.can_cancel())
            .finish()
    }
}

/// Starts continuous replication streams against a remote endpoint.
///
/// Implementations are called from within a Tokio runtime.
pub trait Replicator: Send + Sync {
    fn replicate(
        &self,
        direction: Direction,
        endpoint: &str,
        options: ReplicationOptions,
    ) -> StreamHandle;
}
