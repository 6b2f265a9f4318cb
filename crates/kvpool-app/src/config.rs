//! Application configuration file
//!
//! ```toml
//! [pool]
//! min_connections = 2
//! max_connections = 10
//! acquire_timeout_ms = 5000
//!
//! [pool.endpoint]
//! host = "cache.internal"
//! port = 6379
//!
//! [logging]
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use kvpool_connection::PoolConfig;
use kvpool_core::Endpoint;
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

const CONFIG_FILE_NAME: &str = "kvpool.toml";

/// Everything the binary reads from its TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => match default_config_path() {
                Ok(path) if path.exists() => Self::load_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse a configuration file
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .pool
            .validate()
            .with_context(|| format!("Invalid pool settings in {}", path.display()))?;
        Ok(config)
    }

    /// Replace the configured endpoint with one parsed from `url`
    pub fn apply_url(&mut self, url: &str) -> anyhow::Result<()> {
        let endpoint = Endpoint::from_url(url).context("Invalid --url")?;
        let pool = std::mem::take(&mut self.pool);
        self.pool = pool.with_endpoint(endpoint);
        Ok(())
    }
}

/// Directory holding the default config file
pub fn config_dir() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .context("Could not determine config directory")
        .map(|p| p.join("kvpool"))
}

/// Path of the default config file
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}
