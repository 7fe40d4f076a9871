//! Data directory resolution and engine configuration loading.
//!
//! Reads `config.toml` from the data directory (`~/.murmur/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use murmur_types::config::EngineConfig;

pub const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `MURMUR_DATA_DIR` environment variable
/// 2. `~/.murmur`
/// 3. `./.murmur`
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var("MURMUR_DATA_DIR").ok(), dirs::home_dir())
}

fn data_dir_from(env: Option<String>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env.filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }
    match home {
        Some(home) => home.join(".murmur"),
        None => PathBuf::from(".murmur"),
    }
}

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// Never fails: a missing file yields the defaults, an unreadable or
/// malformed one is logged and also yields the defaults. The result is
/// always validated.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config.validate(),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}
