//! One replication stream in one direction.
//!
//! A [`ReplicationDirection`] consumes the events of a single stream on its
//! own task, tracks the stream's lifecycle, and turns faults into
//! notifications:
//!
//! ```text
//! Idle -> Active <-> Paused -> Complete
//!           \          /
//!            Denied | Error   (terminal)
//! ```
//!
//! A design document that fails to compile on the remote is only a warning;
//! any other fault ends the stream. A `complete` event can still carry
//! failures, which are reported as errors.

use std::sync::{Arc, Mutex};

use chrono::Duration as ChronoDuration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::event::{Canceller, Direction, ReplicationEvent, ReplicationInfo, StreamHandle};
use super::notify::{CompileWarning, Notification, Notifier, ReplicationError};

/// Lifecycle of a replication stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionState {
    Idle,
    Active,
    Paused,
    Complete,
    Denied,
    Error,
}

impl DirectionState {
    /// Terminal states end the stream; a new stream must be started.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DirectionState::Complete | DirectionState::Denied | DirectionState::Error
        )
    }
}

/// Per-session record of which directions are currently paused.
///
/// Shared by the pull and push directions of one session. Both being paused
/// is taken to mean the replicas have converged, which is a heuristic: two
/// unrelated pauses can coincide, and a direction that never runs out of
/// work never reports a settle.
#[derive(Debug, Clone, Default)]
pub struct SettleTracker {
    paused: Arc<Mutex<[bool; 2]>>,
}

impl SettleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a direction's pause state; returns true if both are paused.
    pub fn observe(&self, direction: Direction, paused: bool) -> bool {
        let mut flags = self.paused.lock().unwrap_or_else(|e| e.into_inner());
        flags[direction.index()] = paused;
        flags[0] && flags[1]
    }
}

/// The stream's canceller, shared by the handle and its event loop so
/// whichever gets there first runs it, and only once.
#[derive(Clone)]
struct SharedCanceller(Arc<Mutex<Option<Canceller>>>);

impl SharedCanceller {
    fn new(canceller: Option<Canceller>) -> Self {
        Self(Arc::new(Mutex::new(canceller)))
    }

    fn is_armed(&self) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Runs the canceller if it has not run yet. Returns true if it ran.
    fn fire(&self) -> bool {
        let cancel = self.0.lock().unwrap_or_else(|e| e.into_inner()).take();
        match cancel {
            Some(cancel) => {
                cancel();
                true
            }
            None => false,
        }
    }
}

/// A running replication stream and its observed state.
pub struct ReplicationDirection {
    direction: Direction,
    state: watch::Receiver<DirectionState>,
    canceller: SharedCanceller,
    task: JoinHandle<()>,
}

impl ReplicationDirection {
    /// Starts consuming a stream's events. Must be called within a Tokio
    /// runtime.
    pub fn start(
        direction: Direction,
        stream: StreamHandle,
        notifier: Notifier,
        tracker: SettleTracker,
    ) -> Self {
        let (events, canceller) = stream.into_parts();
        let canceller = SharedCanceller::new(canceller);
        let (state_tx, state) = watch::channel(DirectionState::Idle);

        let task = tokio::spawn(
            EventLoop {
                direction,
                state: state_tx,
                notifier,
                tracker,
                canceller: canceller.clone(),
            }
            .run(events),
        );

        Self {
            direction,
            state,
            canceller,
            task,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> DirectionState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<DirectionState> {
        self.state.clone()
    }

    /// Returns true if the stream has not been cancelled and can be. A
    /// stream that ended with an error has already been cancelled.
    pub fn can_cancel(&self) -> bool {
        self.canceller.is_armed()
    }

    /// Cancels the stream and stops observing it. Repeated calls do nothing.
    pub fn cancel(&mut self) {
        if self.canceller.fire() {
            tracing::debug!("Cancel {} replication", self.direction);
        }
        self.task.abort();
    }
}

impl Drop for ReplicationDirection {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct EventLoop {
    direction: Direction,
    state: watch::Sender<DirectionState>,
    notifier: Notifier,
    tracker: SettleTracker,
    canceller: SharedCanceller,
}

impl EventLoop {
    async fn run(self, mut events: mpsc::UnboundedReceiver<ReplicationEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event).await {
                return;
            }
        }
        tracing::debug!("{} replication stream closed", self.direction);
    }

    /// Handles one event. Returns true once the stream reached a terminal state.
    async fn handle(&self, event: ReplicationEvent) -> bool {
        match event {
            ReplicationEvent::Active => {
                tracing::debug!("Begin {} replication", self.direction);
                if self.transition(DirectionState::Active) {
                    self.tracker.observe(self.direction, false);
                }
                false
            }
            ReplicationEvent::Paused(fault) => {
                match fault {
                    Some(fault) => tracing::debug!("Pause {}: {}", self.direction, fault),
                    None => tracing::debug!("Pause {}", self.direction),
                }
                // Retries report Paused again; only a change of state counts.
                if self.transition(DirectionState::Paused)
                    && self.tracker.observe(self.direction, true)
                {
                    tracing::info!("Replication settled");
                    self.notifier.notify(Notification::Sync);
                }
                false
            }
            ReplicationEvent::Denied(fault) => {
                self.transition(DirectionState::Denied);
                self.retire();
                self.fail(ReplicationError::Denied {
                    direction: self.direction,
                    fault,
                })
                .await;
                true
            }
            ReplicationEvent::Error(fault) if fault.is_design_compile_error() => {
                let warning = CompileWarning {
                    direction: self.direction,
                    fault,
                };
                tracing::warn!("{}", warning);
                self.notifier
                    .notify_deferred(Notification::Warn(warning))
                    .await;
                false
            }
            ReplicationEvent::Error(fault) => {
                self.transition(DirectionState::Error);
                self.retire();
                self.fail(ReplicationError::Transport {
                    direction: self.direction,
                    fault,
                })
                .await;
                true
            }
            ReplicationEvent::Change(info) => {
                self.report_change(&info).await;
                false
            }
            ReplicationEvent::Complete(info) => {
                self.transition(DirectionState::Complete);
                self.tracker.observe(self.direction, false);
                self.report_complete(info).await;
                true
            }
        }
    }

    /// Moves to `next`. Returns false if the state was already `next` or the
    /// stream has ended.
    fn transition(&self, next: DirectionState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }

    /// Stops a stream that ended with a fault: it no longer counts as paused
    /// and the replicator is told to stop.
    fn retire(&self) {
        self.tracker.observe(self.direction, false);
        if self.canceller.fire() {
            tracing::debug!("Cancel {} replication after failure", self.direction);
        }
    }

    async fn fail(&self, error: ReplicationError) {
        tracing::warn!("{}", error);
        self.notifier
            .notify_deferred(Notification::Error(error))
            .await;
    }

    async fn report_change(&self, info: &ReplicationInfo) {
        if !info.ok {
            self.fail(ReplicationError::Change {
                direction: self.direction,
                detail: serde_json::to_string(info).unwrap_or_default(),
            })
            .await;
        }
        if !info.errors.is_empty() {
            self.fail(ReplicationError::Change {
                direction: self.direction,
                detail: serde_json::to_string(&info.errors).unwrap_or_default(),
            })
            .await;
        }

        tracing::debug!(
            "{}: read {}; written {}",
            self.direction,
            info.docs_read,
            info.docs_written
        );
    }

    async fn report_complete(&self, info: ReplicationInfo) {
        if !info.errors.is_empty() {
            for fault in info.errors {
                self.fail(ReplicationError::Document {
                    direction: self.direction,
                    fault,
                })
                .await;
            }
            return;
        }

        if info.doc_write_failures > 0 {
            self.fail(ReplicationError::WriteFailures {
                direction: self.direction,
                failures: info.doc_write_failures,
            })
            .await;
            return;
        }

        if !info.ok {
            self.fail(ReplicationError::NotOk {
                direction: self.direction,
                detail: serde_json::to_string(&info).unwrap_or_default(),
            })
            .await;
            return;
        }

        let elapsed = info
            .end_time
            .map(|end| end - info.start_time)
            .unwrap_or_else(ChronoDuration::zero);
        tracing::info!(
            "{}: {}/{} read/written in {}",
            self.direction,
            info.docs_read,
            info.docs_written,
            duration_label(elapsed)
        );
    }
}

/// Formats a duration for humans, e.g. `1.250s` or `2m 5s`.
pub(crate) fn duration_label(elapsed: ChronoDuration) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    if millis < 60_000 {
        format!("{}.{:03}s", millis / 1000, millis % 1000)
    } else {
        let secs = millis / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
