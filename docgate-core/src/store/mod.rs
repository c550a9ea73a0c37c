//! The document store contract.
//!
//! The store itself is an external collaborator. This module names the
//! operations the rest of the crate relies on and ships [`MemoryStore`], an
//! in-process implementation used by tests and by snapshot-backed
//! databases.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::bulk::BulkWrite;
use crate::document::Document;

pub use memory::{MemoryStore, Snapshot};

/// Errors reported by a document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// A slice of the store's changes feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    /// Latest revision of each changed document, in update order.
    pub docs: Vec<Document>,
    /// Sequence to resume from on the next call.
    pub last_seq: u64,
}

/// Summary counters for a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreInfo {
    pub doc_count: usize,
    pub update_seq: u64,
}

/// Operations consumed from the document store.
#[async_trait]
pub trait DocumentStore: BulkWrite {
    /// Fetches the current revision of a document. Deleted documents are
    /// reported as missing.
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Returns up to `limit` documents changed after sequence `since`.
    async fn changes(&self, since: u64, limit: usize) -> Result<ChangeBatch, StoreError>;

    async fn info(&self) -> Result<StoreInfo, StoreError>;
}
