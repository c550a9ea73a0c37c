//! Per-document write results.

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// A document the store accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSuccess {
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

impl WriteSuccess {
    pub fn new(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: id.into(),
            rev: rev.into(),
        }
    }
}

/// A document that was not written, either because the validator rejected
/// it or because the store refused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteError {
    pub error: bool,
    pub status: u16,
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The validation failure behind a `forbidden` result.
    #[serde(skip)]
    pub cause: Option<ValidationError>,
}

impl WriteError {
    pub fn new(status: u16, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: true,
            status,
            name: name.into(),
            message: message.into(),
            id: None,
            cause: None,
        }
    }

    /// Result for a document the validator rejected.
    pub fn forbidden(cause: ValidationError) -> Self {
        Self {
            cause: Some(cause.clone()),
            ..Self::new(403, "forbidden", cause.message())
        }
    }

    /// Result for a write against a stale or missing revision.
    pub fn conflict(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(409, "conflict", "Document update conflict")
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// What the store reports for one document of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteResult {
    Success(WriteSuccess),
    Failure(WriteError),
}

impl WriteResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteResult::Success(s) if s.ok)
    }
}

impl From<WriteSuccess> for WriteResult {
    fn from(success: WriteSuccess) -> Self {
        WriteResult::Success(success)
    }
}

impl From<WriteError> for WriteResult {
    fn from(error: WriteError) -> Self {
        WriteResult::Failure(error)
    }
}

/// The final result for one position of a batch write.
///
/// Serializes as the store's own result for written documents, or as a
/// `forbidden` error object for rejected ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultSlot {
    Rejected(WriteError),
    Written(WriteResult),
}

impl ResultSlot {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ResultSlot::Rejected(_))
    }

    /// Returns the store's result, if the document reached the store.
    pub fn written(&self) -> Option<&WriteResult> {
        match self {
            ResultSlot::Written(result) => Some(result),
            ResultSlot::Rejected(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forbidden_shape() {
        let slot = ResultSlot::Rejected(WriteError::forbidden(ValidationError::new("bad doc")));
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(
            json,
            json!({"error": true, "status": 403, "name": "forbidden", "message": "bad doc"})
        );
    }

    #[test]
    fn test_forbidden_keeps_cause() {
        let err = WriteError::forbidden(ValidationError::new("bad doc"));
        assert_eq!(err.cause, Some(ValidationError::new("bad doc")));
    }

    #[test]
    fn test_written_serializes_as_store_result() {
        let slot = ResultSlot::Written(WriteSuccess::new("a", "1-x").into());
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json, json!({"ok": true, "id": "a", "rev": "1-x"}));
        assert!(!slot.is_rejected());
    }

    #[test]
    fn test_store_results_deserialize() {
        let results: Vec<WriteResult> = serde_json::from_value(json!([
            {"ok": true, "id": "a", "rev": "1-x"},
            {"error": true, "status": 409, "name": "conflict", "message": "Document update conflict", "id": "b"}
        ]))
        .unwrap();

        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            WriteResult::Failure(WriteError::conflict("b"))
        );
    }
}
