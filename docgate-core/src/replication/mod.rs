//! Continuous two-way replication with an online/offline lifecycle.
//!
//! A [`SyncCoordinator`] owns one pull and one push [`ReplicationDirection`]
//! while online. Errors, warnings and the "sync settled" signal are
//! published through a [`Notifier`].
//!
//! The settled signal fires when both directions are paused at the same
//! time. It is an approximation of "both replicas have converged", not a
//! guarantee.

mod coordinator;
mod direction;
mod event;
mod filter;
mod local;
mod notify;

pub use coordinator::{SessionState, SyncCoordinator, SyncSettings};
pub use direction::{DirectionState, ReplicationDirection, SettleTracker};
pub use event::{
    Canceller, Direction, ReplicationEvent, ReplicationFault, ReplicationInfo,
    ReplicationOptions, Replicator, StreamHandle, DEFAULT_BATCH_SIZE,
};
pub use filter::Filter;
pub use local::StoreReplicator;
pub use notify::{CompileWarning, Notification, Notifier, ReplicationError};
