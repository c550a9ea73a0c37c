//! Splits a batch into accepted and rejected documents.

use crate::document::Document;
use crate::validation::{ValidationError, Validator};

/// The validator's verdict for the document at one batch position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(ValidationError),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

/// Result of running a batch through the gate.
#[derive(Debug, Default)]
pub struct Partition {
    /// Accepted documents, in their original relative order.
    pub accepted: Vec<Document>,
    /// One outcome per submitted document, indexed by batch position.
    pub outcomes: Vec<ValidationOutcome>,
}

/// Runs the configured validator over each document of a batch.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    validator: Option<Validator>,
}

impl ValidationGate {
    /// Creates a gate. Without a validator every document is accepted.
    pub fn new(validator: Option<Validator>) -> Self {
        if validator.is_none() {
            tracing::debug!("No validation function configured; every document will be accepted");
        }
        Self { validator }
    }

    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Validates every document exactly once, in batch order.
    pub fn partition(&self, batch: Vec<Document>) -> Partition {
        let mut partition = Partition {
            accepted: Vec::with_capacity(batch.len()),
            outcomes: Vec::with_capacity(batch.len()),
        };

        for doc in batch {
            let verdict = match &self.validator {
                Some(validator) => validator.validate(&doc),
                None => Ok(()),
            };

            match verdict {
                Ok(()) => {
                    partition.outcomes.push(ValidationOutcome::Accepted);
                    partition.accepted.push(doc);
                }
                Err(reason) => {
                    tracing::debug!("Rejected document {:?}: {}", doc.id(), reason);
                    partition.outcomes.push(ValidationOutcome::Rejected(reason));
                }
            }
        }

        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn doc(id: &str, valid: bool) -> Document {
        Document::from_value(json!({"_id": id, "valid": valid})).unwrap()
    }

    fn valid_flag_validator() -> Validator {
        Validator::new(|doc| match doc.get("valid").and_then(|v| v.as_bool()) {
            Some(true) => Ok(()),
            _ => Err(ValidationError::new("document is not valid")),
        })
    }

    #[test]
    fn test_partition_mixed_batch() {
        let gate = ValidationGate::new(Some(valid_flag_validator()));
        let partition = gate.partition(vec![doc("a", true), doc("b", false), doc("c", true)]);

        let ids: Vec<_> = partition.accepted.iter().map(|d| d.id().unwrap()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(
            partition.outcomes,
            vec![
                ValidationOutcome::Accepted,
                ValidationOutcome::Rejected(ValidationError::new("document is not valid")),
                ValidationOutcome::Accepted,
            ]
        );
    }

    #[test]
    fn test_validator_called_once_per_document() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let gate = ValidationGate::new(Some(Validator::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));

        gate.partition(vec![doc("a", true), doc("b", true), doc("c", false)]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_no_validator_accepts_everything() {
        let gate = ValidationGate::new(None);
        let partition = gate.partition(vec![doc("a", false), doc("b", false)]);

        assert_eq!(partition.accepted.len(), 2);
        assert!(partition.outcomes.iter().all(ValidationOutcome::is_accepted));
    }

    #[test]
    fn test_documents_are_not_modified() {
        let gate = ValidationGate::new(Some(valid_flag_validator()));
        let original = doc("a", true);
        let partition = gate.partition(vec![original.clone()]);
        assert_eq!(partition.accepted[0], original);
    }

    #[test]
    fn test_empty_batch() {
        let gate = ValidationGate::new(Some(valid_flag_validator()));
        let partition = gate.partition(Vec::new());
        assert!(partition.accepted.is_empty());
        assert!(partition.outcomes.is_empty());
    }
}
