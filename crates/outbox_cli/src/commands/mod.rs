//! CLI command implementations.

pub mod clear;
pub mod drain;
pub mod enqueue;
pub mod list;
pub mod status;
pub mod watch;

use outbox_engine::{probe_once, ReqwestClient, SyncConfig, SyncEngine};
use outbox_storage::FileStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Resolved global options.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory of the file-backed store.
    pub data_dir: PathBuf,
    /// Engine configuration.
    pub config: SyncConfig,
}

impl Context {
    /// Opens the store and builds an engine in the given connectivity state.
    pub fn engine(&self, online: bool) -> CommandResult<Arc<SyncEngine<ReqwestClient>>> {
        let store = FileStore::open(&self.data_dir)?;
        let engine = SyncEngine::connect(self.config.clone())?
            .with_storage(Arc::new(store))
            .initially_online(online)
            .build();
        Ok(Arc::new(engine))
    }

    /// Builds an engine whose connectivity comes from one probe.
    pub async fn probed_engine(&self) -> CommandResult<Arc<SyncEngine<ReqwestClient>>> {
        let engine = self.engine(false)?;
        let reachable = probe_once(
            engine.dispatcher().client().as_ref(),
            &self.config.health_path,
        )
        .await;
        engine.monitor().record_probe(reachable);
        Ok(engine)
    }

    /// Returns the store directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Output format of the read-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// JSON.
    Json,
}
