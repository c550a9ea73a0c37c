//! docgate core library
//!
//! Adds two things on top of a document store:
//! - validated bulk writes that return one result per submitted document,
//!   in submission order, even when some documents are rejected
//! - a continuous pull + push replication session with online/offline
//!   control and a heuristic "sync settled" signal

pub mod bulk;
pub mod database;
pub mod design;
pub mod document;
pub mod replication;
pub mod store;
pub mod validation;

pub use bulk::{
    reconcile, BulkOptions, BulkWrite, BulkWriteError, ReconcileError, ResultSlot,
    ValidatedWriter, ValidationGate, ValidationOutcome, WriteError, WriteResult, WriteSuccess,
};
pub use database::{Database, DatabaseCache, DatabaseError, DatabaseOptions};
pub use design::{seed_design_docs, DesignError, SeedOutcome};
pub use document::{new_id, Document, DocumentError};
pub use replication::{
    Direction, DirectionState, Filter, Notification, ReplicationError, ReplicationEvent,
    ReplicationFault, ReplicationInfo, ReplicationOptions, Replicator, SessionState,
    StoreReplicator, StreamHandle, SyncCoordinator, SyncSettings,
};
pub use store::{DocumentStore, MemoryStore, Snapshot, StoreError, StoreInfo};
pub use validation::{require_fields, ValidationError, Validator, ValidatorRegistry};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
