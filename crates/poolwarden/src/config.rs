//! Daemon configuration loading and types

use std::path::{Path, PathBuf};

use poolwarden_core::PoolConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "POOLWARDEN_CONFIG";

/// Top-level configuration for the poolwarden daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Pool to manage; falls back to the persisted configuration when absent
    #[serde(default)]
    pub pool: Option<PoolConfig>,
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory for the persisted pool snapshot and configuration
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Configured storage directory, or the user data directory
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|p| p.join("poolwarden"))
                .unwrap_or_else(|| PathBuf::from(".poolwarden"))
        })
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Find the configuration file to use
    ///
    /// Checks `POOLWARDEN_CONFIG`, then the working directory, `/etc` and the
    /// user config directory.
    #[must_use]
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        let mut paths = vec![
            PathBuf::from("poolwarden.toml"),
            PathBuf::from("/etc/poolwarden/poolwarden.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("poolwarden/poolwarden.toml"));
        }

        paths.into_iter().find(|path| path.exists())
    }

    /// Load from `explicit`, or from default paths, or use defaults
    ///
    /// Returns the configuration and the file it came from.
    pub fn resolve(explicit: Option<&Path>) -> eyre::Result<(Self, Option<PathBuf>)> {
        let path = explicit.map(Path::to_path_buf).or_else(Self::locate);
        match path {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Config::default(), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolwarden_core::VictimSelectionPolicy;

    const SAMPLE: &str = r#"
[daemon]
storage_dir = "/var/lib/poolwarden"
log_level = "debug"

[pool]
name = "workers"
desired_size = 3

[pool.driver]
kind = "simulated"

[pool.driver.settings]
initial_machines = 2
quota = 10

[pool.scale_in]
victim_selection_policy = "closest_to_instance_hour"
instance_hour_margin_secs = 300

[pool.pool_fetch]
refresh_interval_secs = 15
reachability_timeout_secs = 120

[pool.pool_fetch.retries]
max_retries = 4
initial_backoff_ms = 500

[pool.pool_update]
update_interval_secs = 20
"#;

    #[test]
    fn parses_full_document() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(
            config.daemon.storage_dir(),
            PathBuf::from("/var/lib/poolwarden")
        );
        assert_eq!(config.daemon.log_level, "debug");

        let pool = config.pool.unwrap();
        assert_eq!(pool.name, "workers");
        assert_eq!(pool.desired_size, Some(3));
        assert_eq!(pool.driver.kind, "simulated");
        assert_eq!(pool.driver.settings["initial_machines"], 2);
        assert_eq!(
            pool.scale_in.victim_selection_policy,
            VictimSelectionPolicy::ClosestToInstanceHour
        );
        assert_eq!(pool.pool_fetch.retries.max_retries, 4);
        assert_eq!(pool.pool_update.update_interval_secs, 20);
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.storage_dir.is_none());
        assert!(config.pool.is_none());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poolwarden.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let (config, source) = Config::resolve(Some(&path)).unwrap();

        assert_eq!(source.as_deref(), Some(path.as_path()));
        assert_eq!(config.pool.unwrap().name, "workers");
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[pool]\nname = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(&dir.path().join("absent.toml")).is_err());
    }
}
