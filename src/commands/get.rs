use clap::Args;
use docgate_core::DatabaseCache;

use super::{open_local, CommandError};
use crate::config::Config;

/// Print one document
#[derive(Debug, Args)]
pub struct GetCommand {
    /// Database name
    pub db: String,

    /// Document id
    pub id: String,
}

impl GetCommand {
    pub async fn run(
        &self,
        config: &Config,
        databases: &DatabaseCache,
    ) -> Result<(), CommandError> {
        let db = open_local(config, databases, &self.db).await?;
        match db.get(&self.id).await? {
            Some(doc) => {
                println!("{}", serde_json::to_string_pretty(&doc)?);
                Ok(())
            }
            None => Err(CommandError::Input(format!(
                "Document not found: {}/{}",
                self.db, self.id
            ))),
        }
    }
}
