mod config_cmd;
mod get;
mod put;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use get::GetCommand;
pub use put::PutCommand;
pub use sync_cmd::SyncCommand;

use std::sync::Arc;

use docgate_core::{
    require_fields, BulkWriteError, Database, DatabaseCache, DatabaseError, DatabaseOptions,
    DocumentError, StoreError,
};

use crate::config::Config;
use crate::store::SnapshotStore;

/// Opens `name` from the configured prefix, with the configured validation
/// but no replication.
pub async fn open_local(
    config: &Config,
    databases: &DatabaseCache,
    name: &str,
) -> Result<Arc<Database>, CommandError> {
    let store = SnapshotStore::open_in(&config.prefix.value, name).await?;
    let options = local_options(config);
    Ok(databases.open(name, Arc::new(store), options).await?)
}

fn local_options(config: &Config) -> DatabaseOptions {
    let prefix = config.prefix.value.display().to_string();
    let options = DatabaseOptions::new(prefix);
    if config.validation.required_fields.is_empty() {
        options
    } else {
        options.with_validator(require_fields(config.validation.required_fields.clone()))
    }
}

#[derive(Debug)]
pub enum CommandError {
    Input(String),
    NotConfigured(&'static str),
    Io(std::io::Error),
    Json(serde_json::Error),
    Document(DocumentError),
    Database(DatabaseError),
    Write(BulkWriteError),
    Store(StoreError),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Input(msg) => write!(f, "{}", msg),
            CommandError::NotConfigured(what) => write!(f, "{} is not configured", what),
            CommandError::Io(e) => write!(f, "IO error: {}", e),
            CommandError::Json(e) => write!(f, "Invalid JSON: {}", e),
            CommandError::Document(e) => write!(f, "{}", e),
            CommandError::Database(e) => write!(f, "{}", e),
            CommandError::Write(e) => write!(f, "Bulk write failed: {}", e),
            CommandError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Io(e) => Some(e),
            CommandError::Json(e) => Some(e),
            CommandError::Document(e) => Some(e),
            CommandError::Database(e) => Some(e),
            CommandError::Write(e) => Some(e),
            CommandError::Store(e) => Some(e),
            CommandError::Input(_) | CommandError::NotConfigured(_) => None,
        }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::Io(e)
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError::Json(e)
    }
}

impl From<DocumentError> for CommandError {
    fn from(e: DocumentError) -> Self {
        CommandError::Document(e)
    }
}

impl From<DatabaseError> for CommandError {
    fn from(e: DatabaseError) -> Self {
        CommandError::Database(e)
    }
}

impl From<BulkWriteError> for CommandError {
    fn from(e: BulkWriteError) -> Self {
        CommandError::Write(e)
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        CommandError::Store(e)
    }
}
