//! Predicates deciding which documents replicate.

use std::fmt;
use std::sync::Arc;

use crate::document::Document;

/// A replication filter predicate.
#[derive(Clone)]
pub struct Filter(Arc<dyn Fn(&Document) -> bool + Send + Sync>);

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Lets every document through.
    pub fn all_documents() -> Self {
        Self::new(|_| true)
    }

    /// Excludes design documents unless they opt in with `replicate: true`.
    pub fn skip_design_documents() -> Self {
        Self::new(|doc| !doc.is_design() || doc.wants_replication())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        (self.0)(doc)
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::skip_design_documents()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({:p})", Arc::as_ptr(&self.0))
    }
}
