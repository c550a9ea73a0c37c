use clap::Args;
use docgate_core::{BulkOptions, DatabaseCache, Document};
use serde_json::Value;
use std::path::PathBuf;

use super::{open_local, CommandError};
use crate::config::Config;

/// Write a batch of documents
#[derive(Debug, Args)]
pub struct PutCommand {
    /// Database name
    pub db: String,

    /// JSON file holding an array of documents or {"docs": [...]}
    pub file: PathBuf,

    /// Keep the revisions carried by the documents
    #[arg(long)]
    pub no_new_edits: bool,
}

impl PutCommand {
    pub async fn run(
        &self,
        config: &Config,
        databases: &DatabaseCache,
    ) -> Result<(), CommandError> {
        let contents = tokio::fs::read_to_string(&self.file).await?;
        let docs = parse_batch(serde_json::from_str(&contents)?)?;

        let db = open_local(config, databases, &self.db).await?;
        let options = BulkOptions {
            new_edits: !self.no_new_edits,
        };
        let results = db.bulk_write(docs, options).await?;

        println!("{}", serde_json::to_string_pretty(&results)?);
        Ok(())
    }
}

/// Accepts either a bare array of documents or a `{"docs": [...]}` wrapper.
fn parse_batch(value: Value) -> Result<Vec<Document>, CommandError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut wrapper) => match wrapper.remove("docs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(CommandError::Input(
                    "Expected a JSON array or an object with a \"docs\" array".to_string(),
                ))
            }
        },
        _ => {
            return Err(CommandError::Input(
                "Expected a JSON array or an object with a \"docs\" array".to_string(),
            ))
        }
    };

    Ok(items
        .into_iter()
        .map(Document::from_value)
        .collect::<Result<Vec<_>, _>>()?)
}
