//! Design document seeding.
//!
//! Databases are opened with the design documents they expect. Seeding
//! overlays each provided design document onto the stored copy and writes
//! it only when something actually changed, so reopening a database does
//! not churn revisions.

use thiserror::Error;

use crate::bulk::{BulkOptions, BulkWrite, WriteResult};
use crate::document::Document;
use crate::store::{DocumentStore, StoreError};

/// What seeding did to one design document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Error, Debug)]
pub enum DesignError {
    #[error("Not a design document: {0:?}")]
    NotDesignDocument(Option<String>),

    #[error("Failed to store design document {id}: {message}")]
    Rejected { id: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stores the given design documents, skipping ones already up to date.
///
/// Design documents are written straight to the store; they are
/// configuration, not user data, and do not pass through validation.
pub async fn seed_design_docs<S>(
    store: &S,
    db_name: &str,
    ddocs: &[Document],
) -> Result<Vec<SeedOutcome>, DesignError>
where
    S: DocumentStore + ?Sized,
{
    tracing::debug!("Prepare {} design documents for DB: {}", ddocs.len(), db_name);

    let mut outcomes = Vec::with_capacity(ddocs.len());
    for ddoc in ddocs {
        let id = match ddoc.id() {
            Some(id) if ddoc.is_design() => id.to_string(),
            other => return Err(DesignError::NotDesignDocument(other.map(str::to_string))),
        };

        let existing = store.get(&id).await?;
        let mut merged = existing
            .clone()
            .unwrap_or_else(|| Document::with_id(id.clone()));
        for (key, value) in ddoc.fields() {
            if key != "_rev" {
                merged.set(key.clone(), value.clone());
            }
        }

        let outcome = match &existing {
            Some(existing) if existing.body() == merged.body() => SeedOutcome::Unchanged,
            _ => {
                let results = store.bulk_write(vec![merged], BulkOptions::default()).await?;
                match results.into_iter().next() {
                    Some(WriteResult::Success(_)) if existing.is_some() => SeedOutcome::Updated,
                    Some(WriteResult::Success(_)) => SeedOutcome::Created,
                    Some(WriteResult::Failure(err)) => {
                        return Err(DesignError::Rejected {
                            id,
                            message: err.message,
                        })
                    }
                    None => {
                        return Err(DesignError::Rejected {
                            id,
                            message: "store returned no result".to_string(),
                        })
                    }
                }
            }
        };

        tracing::debug!("Prepared ddoc {}/{}: {:?}", db_name, id, outcome);
        outcomes.push(outcome);
    }

    tracing::debug!(
        "Completed preparing {} design documents in DB: {}",
        ddocs.len(),
        db_name
    );
    Ok(outcomes)
}
