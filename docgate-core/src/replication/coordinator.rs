//! Online/offline control of a pull + push replication pair.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::direction::{DirectionState, ReplicationDirection, SettleTracker};
use super::event::{Direction, ReplicationOptions, Replicator, DEFAULT_BATCH_SIZE};
use super::filter::Filter;
use super::notify::{Notification, Notifier};

/// Whether a database is replicating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Online,
    Offline,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Online => write!(f, "online"),
            SessionState::Offline => write!(f, "offline"),
        }
    }
}

/// How a database replicates with its remote.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub endpoint: String,
    /// State to enter when the database opens. `None` means online.
    pub initial_state: Option<SessionState>,
    pub batch_size: usize,
    pub timeout: Option<Duration>,
    pub filter: Filter,
}

impl SyncSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            initial_state: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: None,
            filter: Filter::default(),
        }
    }

    /// Returns true unless the settings explicitly ask to start offline.
    pub fn starts_online(&self) -> bool {
        self.initial_state != Some(SessionState::Offline)
    }

    fn options(&self) -> ReplicationOptions {
        ReplicationOptions {
            batch_size: self.batch_size,
            live: true,
            retry: true,
            timeout: self.timeout,
            filter: self.filter.clone(),
        }
    }
}

/// Both directions of one online session.
struct Pair {
    pull: ReplicationDirection,
    push: ReplicationDirection,
}

impl Pair {
    fn cancel(&mut self) {
        self.pull.cancel();
        self.push.cancel();
    }
}

#[derive(Default)]
struct Session {
    state: Option<SessionState>,
    pair: Option<Pair>,
}

/// Owns the replication pair of one database and its online state.
///
/// The session state and both directions change together under one lock,
/// so a session is always either fully online (two directions) or offline
/// (none).
pub struct SyncCoordinator {
    replicator: Arc<dyn Replicator>,
    settings: SyncSettings,
    notifier: Notifier,
    session: Mutex<Session>,
}

impl SyncCoordinator {
    pub fn new(replicator: Arc<dyn Replicator>, settings: SyncSettings, notifier: Notifier) -> Self {
        Self {
            replicator,
            settings,
            notifier,
            session: Mutex::new(Session::default()),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enters the configured initial state.
    pub fn start(&self) {
        if self.settings.starts_online() {
            self.go_online();
        } else {
            tracing::info!("Replication with {} starts offline", self.settings.endpoint);
            self.go_offline();
        }
    }

    /// Starts a fresh pull + push pair, replacing any previous one.
    ///
    /// Must be called within a Tokio runtime.
    pub fn go_online(&self) {
        let mut session = self.lock();
        if let Some(mut previous) = session.pair.take() {
            previous.cancel();
        }

        tracing::info!("Going online with {}", self.settings.endpoint);
        let tracker = SettleTracker::new();
        let start = |direction| {
            let stream =
                self.replicator
                    .replicate(direction, &self.settings.endpoint, self.settings.options());
            ReplicationDirection::start(direction, stream, self.notifier.clone(), tracker.clone())
        };

        session.pair = Some(Pair {
            pull: start(Direction::Pull),
            push: start(Direction::Push),
        });
        session.state = Some(SessionState::Online);
    }

    /// Cancels both directions. Safe to call at any time.
    pub fn go_offline(&self) {
        let mut session = self.lock();
        if let Some(mut pair) = session.pair.take() {
            tracing::info!("Going offline from {}", self.settings.endpoint);
            pair.cancel();
        }
        session.state = Some(SessionState::Offline);
    }

    /// Current session state; `None` until started.
    pub fn state(&self) -> Option<SessionState> {
        self.lock().state
    }

    /// States of the pull and push directions while online.
    pub fn direction_states(&self) -> Option<(DirectionState, DirectionState)> {
        self.lock()
            .pair
            .as_ref()
            .map(|pair| (pair.pull.state(), pair.push.state()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.go_offline();
    }
}
