//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use st_core::{DEFAULT_ICON_TEMPLATE, EngineConfig};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Seconds between periodic flushes of the active session.
    pub flush_interval_secs: u64,

    /// Seconds between retention sweeps.
    pub sweep_interval_secs: u64,

    /// Daily buckets older than this many days are deleted.
    pub retention_days: u32,

    /// Icon reference template; `{domain}` is replaced by the domain.
    pub icon_template: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("flush_interval_secs", &self.flush_interval_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("retention_days", &self.retention_days)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let engine = EngineConfig::default();
        Self {
            database_path: data_dir.join("st.db"),
            flush_interval_secs: engine.flush_interval.as_secs(),
            sweep_interval_secs: engine.sweep_interval.as_secs(),
            retention_days: engine.retention_days,
            icon_template: DEFAULT_ICON_TEMPLATE.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // ST_DATABASE_PATH, ST_RETENTION_DAYS, ...
        figment = figment.merge(Env::prefixed("ST_"));

        figment.extract()
    }

    /// Engine settings. Intervals are at least one second.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            retention_days: self.retention_days,
            icon_template: self.icon_template.clone(),
        }
    }
}

/// Returns the platform-specific config directory for st.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("st"))
}

/// Returns the platform-specific data directory for st.
///
/// On Linux: `~/.local/share/st`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("st"))
}
