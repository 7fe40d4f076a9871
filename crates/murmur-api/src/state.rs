//! Application state wiring the store and configuration together.

use std::path::PathBuf;
use std::sync::Arc;

use murmur_infra::config::{load_engine_config, resolve_data_dir};
use murmur_infra::sqlite::character::SqliteCharacterRepository;
use murmur_infra::sqlite::pool::DatabasePool;
use murmur_types::config::EngineConfig;

/// Shared state for every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<SqliteCharacterRepository>,
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, open the database and load `config.toml`.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let db_pool = DatabasePool::open(&data_dir).await?;
        let config = load_engine_config(&data_dir).await;

        tracing::debug!(data_dir = %data_dir.display(), "application state initialized");
        Ok(Self {
            repo: Arc::new(SqliteCharacterRepository::new(db_pool)),
            config: Arc::new(config),
            data_dir,
        })
    }
}
