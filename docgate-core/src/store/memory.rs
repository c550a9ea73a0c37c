//! In-memory document store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{ChangeBatch, DocumentStore, StoreError, StoreInfo};
use crate::bulk::{BulkOptions, BulkWrite, WriteError, WriteResult, WriteSuccess};
use crate::document::{new_id, revision_generation, Document};

/// A stored document and the update sequence that last touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredDoc {
    seq: u64,
    doc: Document,
}

/// Complete store contents, suitable for persisting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    update_seq: u64,
    docs: BTreeMap<String, StoredDoc>,
}

impl Snapshot {
    pub fn update_seq(&self) -> u64 {
        self.update_seq
    }

    fn write(&mut self, id: String, mut doc: Document, rev: String) {
        self.update_seq += 1;
        doc.set_id(id.clone());
        doc.set_rev(rev);
        self.docs.insert(
            id,
            StoredDoc {
                seq: self.update_seq,
                doc,
            },
        );
    }

    /// Applies one document with the store generating the revision.
    fn apply_edit(&mut self, doc: Document) -> WriteResult {
        let id = doc.id().map(str::to_string).unwrap_or_else(new_id);
        let current = self.docs.get(&id).map(|stored| &stored.doc);

        let parent = match (current, doc.rev()) {
            (None, None) => None,
            (Some(current), Some(rev)) if current.rev() == Some(rev) => current.rev(),
            (Some(current), None) if current.is_deleted() => current.rev(),
            _ => return WriteError::conflict(id).into(),
        };

        let generation = match parent.and_then(revision_generation).unwrap_or(0).checked_add(1) {
            Some(generation) => generation,
            None => {
                return WriteError::new(
                    400,
                    "bad_request",
                    format!("Revision generation exhausted for {}", id),
                )
                .with_id(Some(id))
                .into()
            }
        };
        let rev = format!("{}-{}", generation, digest(parent, &doc));
        self.write(id.clone(), doc, rev.clone());
        WriteSuccess::new(id, rev).into()
    }

    /// Applies one document keeping the revision it carries.
    ///
    /// A revision no newer than the stored one leaves the store untouched.
    fn apply_replicated(&mut self, doc: Document) -> WriteResult {
        let (id, rev) = match (doc.id(), doc.rev()) {
            (Some(id), Some(rev)) => (id.to_string(), rev.to_string()),
            _ => {
                return WriteError::new(
                    400,
                    "bad_request",
                    "Document must have an _id and _rev when new_edits is false",
                )
                .with_id(doc.id().map(str::to_string))
                .into()
            }
        };

        let incoming = match revision_generation(&rev) {
            Some(generation) => generation,
            None => {
                return WriteError::new(400, "bad_request", format!("Invalid rev format: {}", rev))
                    .with_id(Some(id))
                    .into()
            }
        };

        let stored = self
            .docs
            .get(&id)
            .and_then(|stored| stored.doc.rev())
            .and_then(revision_generation);

        if stored.map_or(true, |stored| incoming > stored) {
            self.write(id.clone(), doc, rev.clone());
        }
        WriteSuccess::new(id, rev).into()
    }
}

fn digest(parent: Option<&str>, doc: &Document) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.unwrap_or_default().as_bytes());
    hasher.update(b":");
    // A map of JSON values always serializes.
    hasher.update(serde_json::to_vec(&doc.body()).unwrap_or_default());
    let hash = hasher.finalize();
    hash[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Document store held entirely in memory.
///
/// Documents are kept in update order for the changes feed; revisions are
/// `<generation>-<digest>` where the digest covers the parent revision and
/// the document body.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a store from a previously taken snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Copies the current store contents.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl BulkWrite for MemoryStore {
    async fn bulk_write(
        &self,
        docs: Vec<Document>,
        options: BulkOptions,
    ) -> Result<Vec<WriteResult>, StoreError> {
        let mut state = self.state.write().await;
        let results = docs
            .into_iter()
            .map(|doc| {
                if options.new_edits {
                    state.apply_edit(doc)
                } else {
                    state.apply_replicated(doc)
                }
            })
            .collect();
        Ok(results)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .docs
            .get(id)
            .filter(|stored| !stored.doc.is_deleted())
            .map(|stored| stored.doc.clone()))
    }

    async fn changes(&self, since: u64, limit: usize) -> Result<ChangeBatch, StoreError> {
        let state = self.state.read().await;
        let mut changed: Vec<&StoredDoc> = state.docs.values().filter(|s| s.seq > since).collect();
        changed.sort_by_key(|stored| stored.seq);
        changed.truncate(limit);

        let last_seq = changed.last().map_or(since, |stored| stored.seq);
        Ok(ChangeBatch {
            docs: changed.into_iter().map(|stored| stored.doc.clone()).collect(),
            last_seq,
        })
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        let state = self.state.read().await;
        Ok(StoreInfo {
            doc_count: state.docs.values().filter(|s| !s.doc.is_deleted()).count(),
            update_seq: state.update_seq,
        })
    }
}
