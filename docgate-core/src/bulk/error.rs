//! Bulk write error types.

use thiserror::Error;

use crate::store::StoreError;

/// The store returned a result count that does not match the number of
/// documents it was given.
///
/// Either variant means the store integration is broken; no partial result
/// is ever produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Unknown error building bulk write result, ran out of store results ({returned} returned for {submitted} documents)")]
    Underflow { submitted: usize, returned: usize },

    #[error("Unknown error building bulk write result, too many store results ({returned} returned for {submitted} documents)")]
    Overflow { submitted: usize, returned: usize },
}

/// Errors that abort a whole batch write.
#[derive(Error, Debug)]
pub enum BulkWriteError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
