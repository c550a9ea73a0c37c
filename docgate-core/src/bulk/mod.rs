//! Validated bulk write pipeline.
//!
//! A batch write flows through three stages:
//! 1. [`ValidationGate`] runs the validator over every document and splits
//!    the batch into accepted documents and a positional outcome list
//! 2. the accepted documents are written to the underlying store
//! 3. [`reconcile`] merges the store's results back into a list with one
//!    slot per submitted document, in submission order
//!
//! [`ValidatedWriter`] composes the three stages around any [`BulkWrite`]
//! implementation.

mod error;
mod gate;
mod reconcile;
mod result;
mod writer;

pub use error::{BulkWriteError, ReconcileError};
pub use gate::{Partition, ValidationGate, ValidationOutcome};
pub use reconcile::reconcile;
pub use result::{ResultSlot, WriteError, WriteResult, WriteSuccess};
pub use writer::{BulkOptions, BulkWrite, ValidatedWriter};
