//! Validated bulk writes composed around a store's write primitive.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::BulkWriteError;
use super::gate::{Partition, ValidationGate};
use super::reconcile::reconcile;
use super::result::{ResultSlot, WriteResult};
use crate::document::Document;
use crate::store::StoreError;
use crate::validation::Validator;

/// Options passed through to the store's bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// When false, the store keeps the revisions carried by the documents
    /// instead of generating new ones (used by replication).
    pub new_edits: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self { new_edits: true }
    }
}

/// A store's batch write primitive.
///
/// Implementations must return exactly one result per submitted document,
/// in submission order.
#[async_trait]
pub trait BulkWrite: Send + Sync {
    async fn bulk_write(
        &self,
        docs: Vec<Document>,
        options: BulkOptions,
    ) -> Result<Vec<WriteResult>, StoreError>;
}

/// Wraps a batch write primitive with per-document validation.
///
/// Rejected documents never reach the store. The returned list still has
/// one slot per submitted document, in submission order.
pub struct ValidatedWriter<W: ?Sized> {
    gate: ValidationGate,
    inner: Arc<W>,
}

impl<W: BulkWrite + ?Sized> ValidatedWriter<W> {
    pub fn new(inner: Arc<W>, validator: Option<Validator>) -> Self {
        Self {
            gate: ValidationGate::new(validator),
            inner,
        }
    }

    pub fn gate(&self) -> &ValidationGate {
        &self.gate
    }

    pub fn inner(&self) -> &Arc<W> {
        &self.inner
    }

    /// Validates the batch, writes the accepted documents, and rebuilds the
    /// full result list.
    pub async fn bulk_write(
        &self,
        docs: Vec<Document>,
        options: BulkOptions,
    ) -> Result<Vec<ResultSlot>, BulkWriteError> {
        let total = docs.len();
        let Partition { accepted, outcomes } = self.gate.partition(docs);
        let valid = accepted.len();

        let store_results = self.inner.bulk_write(accepted, options).await?;
        let slots = reconcile(&outcomes, store_results)?;

        tracing::debug!("Bulk write complete; {}/{} valid docs", valid, total);
        Ok(slots)
    }
}
