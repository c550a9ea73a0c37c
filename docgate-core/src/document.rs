//! JSON documents as understood by the document store.
//!
//! A document is a JSON object. The store reserves a handful of underscore
//! fields:
//! - `_id`: document identity (assigned by the store when missing)
//! - `_rev`: revision, formatted as `<generation>-<digest>`
//! - `_deleted`: tombstone marker
//!
//! Design documents are identified by an `_id` starting with `_design/`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Prefix shared by all design document ids.
pub const DESIGN_PREFIX: &str = "_design/";

/// Field a design document sets to `true` to take part in replication.
pub const REPLICATE_MARKER: &str = "replicate";

/// Errors that can occur when building a document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid document JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// One document submitted to or read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Creates an empty document with no id.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Creates an empty document with the given id.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.set("_id", Value::String(id.into()));
        doc
    }

    /// Builds a document from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(DocumentError::NotAnObject("null")),
            Value::Bool(_) => Err(DocumentError::NotAnObject("a boolean")),
            Value::Number(_) => Err(DocumentError::NotAnObject("a number")),
            Value::String(_) => Err(DocumentError::NotAnObject("a string")),
            Value::Array(_) => Err(DocumentError::NotAnObject("an array")),
        }
    }

    /// Parses a document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("_id").and_then(Value::as_str)
    }

    pub fn rev(&self) -> Option<&str> {
        self.0.get("_rev").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.set("_id", Value::String(id.into()));
    }

    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.set("_rev", Value::String(rev.into()));
    }

    /// Returns true if this is a design document.
    pub fn is_design(&self) -> bool {
        self.id().is_some_and(|id| id.starts_with(DESIGN_PREFIX))
    }

    /// Returns true if the document is a deletion tombstone.
    pub fn is_deleted(&self) -> bool {
        self.0.get("_deleted").and_then(Value::as_bool) == Some(true)
    }

    /// Returns true if the document explicitly opts in to replication.
    pub fn wants_replication(&self) -> bool {
        self.0.get(REPLICATE_MARKER).and_then(Value::as_bool) == Some(true)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the document body without the `_rev` field.
    ///
    /// Two documents with equal bodies carry the same content regardless of
    /// which revision they were read at.
    pub fn body(&self) -> Map<String, Value> {
        let mut body = self.0.clone();
        body.remove("_rev");
        body
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Returns the generation number of a revision string (`"3-abc"` -> `3`).
pub fn revision_generation(rev: &str) -> Option<u64> {
    let (generation, digest) = rev.split_once('-')?;
    if digest.is_empty() {
        return None;
    }
    generation.parse().ok()
}

/// Generates a random document id.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
