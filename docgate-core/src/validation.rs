//! Per-document write validation.
//!
//! A validator inspects one document and either accepts it or rejects it
//! with a reason. Validators are registered per database in a
//! [`ValidatorRegistry`], keyed by storage prefix and database name.
//!
//! A database opened twice under the same key must not silently lose or
//! swap its validator: the registry only ever adds validators, and
//! rejects any attempt to replace one with a different function.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::document::Document;

/// A validator rejected a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Shared document validator.
///
/// Two `Validator`s are the same validator only if they point to the same
/// function object.
#[derive(Clone)]
pub struct Validator(Arc<dyn Fn(&Document) -> Result<(), ValidationError> + Send + Sync>);

impl Validator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Document) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Runs the validator against a document.
    pub fn validate(&self, doc: &Document) -> Result<(), ValidationError> {
        (self.0)(doc)
    }

    /// Returns true if both handles refer to the same validator.
    pub fn same_as(&self, other: &Validator) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({:p})", Arc::as_ptr(&self.0))
    }
}

/// Builds a validator that rejects documents missing any of the given fields.
pub fn require_fields<I, S>(fields: I) -> Validator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
    Validator::new(move |doc| {
        // Tombstones carry no body to validate.
        if doc.is_deleted() {
            return Ok(());
        }
        match fields.iter().find(|field| doc.get(field).is_none()) {
            Some(missing) => Err(ValidationError::new(format!(
                "Missing required field: {}",
                missing
            ))),
            None => Ok(()),
        }
    })
}

/// Errors raised by the validator registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Validation function already set for DB {0}; cannot change it")]
    ValidatorConflict(String),

    #[error("Validation function for DB {0} already exists")]
    AlreadyRegistered(String),
}

/// Registry of validators keyed by `<prefix>:<database name>`.
///
/// Construct one at startup and pass it by reference to everything that
/// opens databases.
#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    validators: RwLock<HashMap<String, Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(prefix: &str, name: &str) -> String {
        format!("{}:{}", prefix, name)
    }

    /// Returns the validator registered for a database, if any.
    pub fn get(&self, prefix: &str, name: &str) -> Option<Validator> {
        let validators = self.validators.read().unwrap_or_else(|e| e.into_inner());
        validators.get(&Self::key(prefix, name)).cloned()
    }

    /// Registers a validator for a database. Fails if one already exists.
    pub fn register(
        &self,
        prefix: &str,
        name: &str,
        validator: Validator,
    ) -> Result<Validator, RegistryError> {
        let key = Self::key(prefix, name);
        let mut validators = self.validators.write().unwrap_or_else(|e| e.into_inner());
        if validators.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }

        tracing::debug!("Set validation function: {}", key);
        validators.insert(key, validator.clone());
        Ok(validator)
    }

    /// Resolves the validator a database handle should use.
    ///
    /// - a cached validator and a different provided one is a conflict
    /// - a provided validator with nothing cached gets cached
    /// - a cached validator is returned even if none was provided
    pub fn resolve(
        &self,
        prefix: &str,
        name: &str,
        provided: Option<Validator>,
    ) -> Result<Option<Validator>, RegistryError> {
        let key = Self::key(prefix, name);
        let mut validators = self.validators.write().unwrap_or_else(|e| e.into_inner());

        let cached = validators.get(&key).cloned();
        match (cached, provided) {
            (Some(cached), Some(provided)) if !cached.same_as(&provided) => {
                Err(RegistryError::ValidatorConflict(key))
            }
            (Some(cached), _) => Ok(Some(cached)),
            (None, Some(provided)) => {
                tracing::debug!("Set validation function: {}", key);
                validators.insert(key, provided.clone());
                Ok(Some(provided))
            }
            (None, None) => Ok(None),
        }
    }
}
