//! Replicates a database with the configured remote.

use clap::Args;
use docgate_core::{DatabaseCache, Notification, SessionState, StoreReplicator, SyncSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use super::{local_options, CommandError};
use crate::config::{Config, SyncConfig};
use crate::store::SnapshotStore;

/// Replicate with the remote until interrupted
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Database name
    pub db: String,

    /// Stop once both directions have caught up
    #[arg(long)]
    pub exit_on_settle: bool,
}

impl SyncCommand {
    pub async fn run(
        &self,
        config: &Config,
        databases: &DatabaseCache,
    ) -> Result<(), CommandError> {
        let remote_dir = config
            .sync
            .remote
            .as_deref()
            .ok_or(CommandError::NotConfigured("sync.remote (or DOCGATE_REMOTE)"))?;
        if config.sync.mode == SessionState::Offline {
            return Err(CommandError::Input(
                "Sync mode is offline; set sync.mode or DOCGATE_SYNC to online".to_string(),
            ));
        }

        let local = Arc::new(SnapshotStore::open_in(&config.prefix.value, &self.db).await?);
        let remote =
            Arc::new(SnapshotStore::open_in(&PathBuf::from(remote_dir), &self.db).await?);
        let endpoint = remote.path().display().to_string();
        let replicator = Arc::new(StoreReplicator::new(local.clone(), remote));

        let options =
            local_options(config).with_sync(replicator, settings(&config.sync, endpoint));
        let db = databases.open(&self.db, local, options).await?;
        let mut notifications = db.subscribe();

        println!("Syncing {} with {}...", self.db, remote_dir);

        loop {
            tokio::select! {
                received = notifications.recv() => match received {
                    Ok(Notification::Sync) => {
                        println!("✓ in sync");
                        if self.exit_on_settle {
                            break;
                        }
                    }
                    Ok(Notification::Warn(warning)) => eprintln!("Warning: {}", warning),
                    Ok(Notification::Error(error)) => eprintln!("Error: {}", error),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Skipped {} sync notifications", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
        }

        db.go_offline();
        println!("Sync stopped.");
        Ok(())
    }
}

fn settings(sync: &SyncConfig, endpoint: String) -> SyncSettings {
    SyncSettings {
        batch_size: sync.batch_size,
        timeout: sync.timeout_secs.map(Duration::from_secs),
        ..SyncSettings::new(endpoint)
    }
}
