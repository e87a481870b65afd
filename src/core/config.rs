use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::error::{Result, SiError};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/sicore/sicore.toml", "./sicore.toml"];

/// Runtime configuration of the transactional core.
///
/// Load priority: CLI args (applied by the binaries) > ENV (`SICORE_*`) > config file > defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SiConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_block_size")]
    pub timestamp_block_size: u64,
    #[serde(default = "default_bind")]
    pub timestamp_bind: String,
    #[serde(default = "default_request_timeout_ms")]
    pub timestamp_request_timeout_ms: u64,
    #[serde(default = "default_completed_cache_size")]
    pub completed_cache_size: usize,
    #[serde(default = "default_completed_cache_shards")]
    pub completed_cache_shards: usize,
    #[serde(default = "default_ignore_warn_threshold")]
    pub ignore_cache_warn_threshold: usize,
}

fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_block_size() -> u64 { 8192 }
fn default_bind() -> String { "127.0.0.1:60012".to_string() }
fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_completed_cache_size() -> usize { 65_536 }
fn default_completed_cache_shards() -> usize { 16 }
fn default_ignore_warn_threshold() -> usize { 100_000 }

impl Default for SiConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            timestamp_block_size: default_block_size(),
            timestamp_bind: default_bind(),
            timestamp_request_timeout_ms: default_request_timeout_ms(),
            completed_cache_size: default_completed_cache_size(),
            completed_cache_shards: default_completed_cache_shards(),
            ignore_cache_warn_threshold: default_ignore_warn_threshold(),
        }
    }
}

impl SiConfig {
    /// Loads the first default config file found (if any), then `SICORE_*` overrides.
    pub fn load() -> Result<Self> {
        let found = DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists());
        Self::load_from(found)
    }

    /// Loads an explicit config file (must exist when given), then `SICORE_*` overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            tracing::debug!("Loading config from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        // Nested keys use "__" so that data_dir stays a single key
        builder = builder.add_source(
            Environment::with_prefix("SICORE")
                .prefix_separator("_")
                .separator("__"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timestamp_block_size == 0 {
            return Err(SiError::Config("timestamp_block_size must be > 0".into()));
        }
        if self.completed_cache_size == 0 {
            return Err(SiError::Config("completed_cache_size must be > 0".into()));
        }
        if self.completed_cache_shards == 0 {
            return Err(SiError::Config("completed_cache_shards must be > 0".into()));
        }
        Ok(())
    }

    #[must_use]
    pub const fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timestamp_request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = SiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timestamp_block_size, 8192);
        assert_eq!(config.timestamp_bind, "127.0.0.1:60012");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sicore.toml");
        std::fs::write(
            &path,
            "timestamp_block_size = 100\ncompleted_cache_size = 10\ndata_dir = \"/tmp/si\"\n",
        )
        .unwrap();

        let config = SiConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.timestamp_block_size, 100);
        assert_eq!(config.completed_cache_size, 10);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/si"));
        // untouched keys keep their defaults
        assert_eq!(config.completed_cache_shards, 16);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sicore.toml");
        std::fs::write(&path, "timestamp_block_size = 0\n").unwrap();

        let err = SiConfig::load_from(Some(&path)).unwrap_err();
        assert!(matches!(err, SiError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");
        assert!(SiConfig::load_from(Some(&path)).is_err());
    }
}
