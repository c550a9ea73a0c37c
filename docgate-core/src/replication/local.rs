//! In-process replication between two document stores.
//!
//! Follows the source's changes feed in batches, writes matching documents
//! to the target with their revisions preserved, and reports progress as
//! [`ReplicationEvent`]s. Live streams poll for new changes after catching
//! up; one-shot streams complete instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};

use super::event::{
    Direction, ReplicationEvent, ReplicationFault, ReplicationInfo, ReplicationOptions, Replicator,
    StreamHandle,
};
use crate::bulk::{BulkOptions, BulkWrite, WriteResult};
use crate::document::Document;
use crate::store::{DocumentStore, StoreError};

/// How often a caught-up live stream checks for new changes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// How long a retrying stream waits after a failure.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Replicates between a local store and a "remote" store in the same process.
#[derive(Clone)]
pub struct StoreReplicator {
    local: Arc<dyn DocumentStore>,
    remote: Arc<dyn DocumentStore>,
    poll_interval: Duration,
    retry_backoff: Duration,
}

impl StoreReplicator {
    pub fn new(local: Arc<dyn DocumentStore>, remote: Arc<dyn DocumentStore>) -> Self {
        Self {
            local,
            remote,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

impl Replicator for StoreReplicator {
    fn replicate(
        &self,
        direction: Direction,
        endpoint: &str,
        options: ReplicationOptions,
    ) -> StreamHandle {
        let (source, target) = match direction {
            Direction::Pull => (self.remote.clone(), self.local.clone()),
            Direction::Push => (self.local.clone(), self.remote.clone()),
        };
        tracing::debug!("Start {} replication with {}", direction, endpoint);

        let (events, handle) = StreamHandle::channel();
        let (cancel_tx, cancel) = watch::channel(false);

        let worker = Worker {
            source,
            target,
            options,
            poll_interval: self.poll_interval,
            retry_backoff: self.retry_backoff,
            events,
            cancel,
        };
        tokio::spawn(worker.run());

        handle.with_canceller(move || {
            let _ = cancel_tx.send(true);
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Active,
    Paused,
}

/// Outcome of replicating one batch of changes.
struct Batch {
    last_seq: u64,
    read: u64,
    written: u64,
    failures: Vec<ReplicationFault>,
}

struct Worker {
    source: Arc<dyn DocumentStore>,
    target: Arc<dyn DocumentStore>,
    options: ReplicationOptions,
    poll_interval: Duration,
    retry_backoff: Duration,
    events: mpsc::UnboundedSender<ReplicationEvent>,
    cancel: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        let mut info = ReplicationInfo::started();
        let mut phase = Phase::Starting;
        let mut since = 0;

        while !self.is_cancelled() {
            match self.replicate_batch(since).await {
                Ok(Some(batch)) => {
                    if let Some(denied) = batch.failures.iter().find(|f| is_denial(f)) {
                        self.emit(ReplicationEvent::Denied(denied.clone()));
                        return;
                    }
                    if phase != Phase::Active && !self.emit(ReplicationEvent::Active) {
                        return;
                    }
                    phase = Phase::Active;

                    since = batch.last_seq;
                    info.docs_read += batch.read;
                    info.docs_written += batch.written;
                    info.doc_write_failures += batch.failures.len() as u64;
                    info.errors.extend(batch.failures.iter().cloned());

                    let change = ReplicationInfo {
                        errors: batch.failures,
                        ..info.clone()
                    };
                    if !self.emit(ReplicationEvent::Change(change)) {
                        return;
                    }
                }
                Ok(None) if !self.options.live => {
                    self.emit(ReplicationEvent::Complete(info.finish()));
                    return;
                }
                Ok(None) => {
                    if phase != Phase::Paused && !self.emit(ReplicationEvent::Paused(None)) {
                        return;
                    }
                    phase = Phase::Paused;
                    if self.wait(self.poll_interval).await {
                        return;
                    }
                }
                Err(fault) if self.options.retry => {
                    tracing::debug!("Replication failed, retrying: {}", fault);
                    if !self.emit(ReplicationEvent::Paused(Some(fault))) {
                        return;
                    }
                    phase = Phase::Paused;
                    if self.wait(self.retry_backoff).await {
                        return;
                    }
                }
                Err(fault) => {
                    self.emit(ReplicationEvent::Error(fault));
                    return;
                }
            }
        }
    }

    /// Replicates the next batch of changes. `None` means caught up.
    async fn replicate_batch(&self, since: u64) -> Result<Option<Batch>, ReplicationFault> {
        let changes = self
            .call(self.source.changes(since, self.options.batch_size))
            .await?;
        if changes.docs.is_empty() {
            return Ok(None);
        }

        let read = changes.docs.len() as u64;
        let docs: Vec<Document> = changes
            .docs
            .into_iter()
            .filter(|doc| self.options.filter.matches(doc))
            .collect();

        let results = if docs.is_empty() {
            Vec::new()
        } else {
            self.call(self.target.bulk_write(docs, BulkOptions { new_edits: false }))
                .await?
        };

        let mut written = 0;
        let mut failures = Vec::new();
        for result in results {
            match result {
                WriteResult::Success(_) => written += 1,
                WriteResult::Failure(err) => {
                    let mut fault = ReplicationFault::new(err.name, err.message).with_status(err.status);
                    fault.id = err.id;
                    failures.push(fault);
                }
            }
        }

        Ok(Some(Batch {
            last_seq: changes.last_seq,
            read,
            written,
            failures,
        }))
    }

    /// Runs one store call under the configured timeout.
    async fn call<T, F>(&self, operation: F) -> Result<T, ReplicationFault>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match self.options.timeout {
            Some(limit) => timeout(limit, operation)
                .await
                .unwrap_or(Err(StoreError::Timeout(limit))),
            None => operation.await,
        };
        result.map_err(|e| match e {
            StoreError::Timeout(_) => ReplicationFault::new("timeout", e.to_string()).with_status(408),
            _ => ReplicationFault::new("store_error", e.to_string()).with_status(503),
        })
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Sends an event. Returns false once nobody is listening.
    fn emit(&self, event: ReplicationEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Sleeps for `period`. Returns true if the stream was cancelled meanwhile.
    async fn wait(&mut self, period: Duration) -> bool {
        tokio::select! {
            _ = sleep(period) => false,
            _ = self.cancel.changed() => true,
        }
    }
}

fn is_denial(fault: &ReplicationFault) -> bool {
    matches!(fault.status, Some(401) | Some(403))
}
