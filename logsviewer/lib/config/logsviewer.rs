//! The logsviewer configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    store::StoreOptions,
    utils::{
        get_logsviewer_home_path, ENRICHMENT_FILENAME, LOGSVIEWER_DB_FILENAME, STAGING_SUBDIR,
    },
    LogsViewerError, LogsViewerResult,
};

use super::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_STORE_TIMEOUT_MS, DEFAULT_WORKERS,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where logsviewer keeps its data and how the persistence queue behaves.
///
/// Paths left unset are derived from the home directory, which itself defaults to
/// `$LOGSVIEWER_HOME` or `~/.logsviewer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[serde(deny_unknown_fields)]
pub struct LogsViewerConfig {
    /// The home directory.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default, setter(strip_option, into))]
    home_dir: Option<PathBuf>,

    /// The record database.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default, setter(strip_option, into))]
    db_path: Option<PathBuf>,

    /// The directory archives are extracted into. Cleared before every import.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default, setter(strip_option, into))]
    staging_dir: Option<PathBuf>,

    /// The enrichment lookup document.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default, setter(strip_option, into))]
    enrichment_file: Option<PathBuf>,

    /// Number of persistence workers.
    #[serde(default = "default_workers")]
    #[builder(default = DEFAULT_WORKERS)]
    #[getset(get = "pub with_prefix")]
    workers: usize,

    /// Deadline of a single store operation, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    #[builder(default = DEFAULT_STORE_TIMEOUT_MS)]
    #[getset(get = "pub with_prefix")]
    store_timeout_ms: u64,

    /// Retries of a failed store operation before the record is dropped.
    #[serde(default = "default_max_retries")]
    #[builder(default = DEFAULT_MAX_RETRIES)]
    #[getset(get = "pub with_prefix")]
    max_retries: u32,

    /// First retry delay, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    #[builder(default = DEFAULT_BACKOFF_BASE_MS)]
    #[getset(get = "pub with_prefix")]
    backoff_base_ms: u64,

    /// Upper bound of the retry delay, in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    #[builder(default = DEFAULT_BACKOFF_MAX_MS)]
    #[getset(get = "pub with_prefix")]
    backoff_max_ms: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LogsViewerConfig {
    /// Loads a configuration from a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> LogsViewerResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise the configuration file in the home directory if it
    /// exists, otherwise the defaults.
    pub async fn load_or_default(path: Option<&Path>) -> LogsViewerResult<Self> {
        if let Some(path) = path {
            return Self::load(path).await;
        }

        let default_path = get_logsviewer_home_path().join(crate::utils::LOGSVIEWER_CONFIG_FILENAME);
        if tokio::fs::try_exists(&default_path).await? {
            tracing::debug!(path = %default_path.display(), "Loading configuration");
            return Self::load(default_path).await;
        }

        Ok(Self::default())
    }

    /// Rejects settings the store cannot run with.
    pub fn validate(&self) -> LogsViewerResult<()> {
        if self.workers == 0 {
            return Err(LogsViewerError::InvalidArgument(
                "workers must be at least 1".to_string(),
            ));
        }

        if self.store_timeout_ms == 0 {
            return Err(LogsViewerError::InvalidArgument(
                "store_timeout_ms must be at least 1".to_string(),
            ));
        }

        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(LogsViewerError::InvalidArgument(format!(
                "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }

        Ok(())
    }

    /// Replaces the home directory. Paths set explicitly are kept.
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    /// The home directory.
    pub fn home_dir(&self) -> PathBuf {
        self.home_dir
            .clone()
            .unwrap_or_else(get_logsviewer_home_path)
    }

    /// The record database.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.home_dir().join(LOGSVIEWER_DB_FILENAME))
    }

    /// The staging directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| self.home_dir().join(STAGING_SUBDIR))
    }

    /// The enrichment lookup document.
    pub fn enrichment_file(&self) -> PathBuf {
        self.enrichment_file
            .clone()
            .unwrap_or_else(|| self.home_dir().join(ENRICHMENT_FILENAME))
    }

    /// The persistence queue settings.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::builder()
            .timeout(Duration::from_millis(self.store_timeout_ms))
            .max_retries(self.max_retries)
            .backoff_base(Duration::from_millis(self.backoff_base_ms))
            .backoff_max(Duration::from_millis(self.backoff_max_ms))
            .build()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for LogsViewerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Serde Defaults
//--------------------------------------------------------------------------------------------------

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_from_home() {
        let config = LogsViewerConfig::builder().home_dir("/data/lv").build();
        assert_eq!(config.db_path(), PathBuf::from("/data/lv/logsviewer.db"));
        assert_eq!(config.staging_dir(), PathBuf::from("/data/lv/space"));
        assert_eq!(config.enrichment_file(), PathBuf::from("/data/lv/result.json"));

        let config = LogsViewerConfig::builder()
            .home_dir("/data/lv")
            .db_path("/var/lib/records.db")
            .build();
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/records.db"));
    }

    #[tokio::test]
    async fn test_load_yaml_with_defaults() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("logsviewer.yaml");
        std::fs::write(&path, "home_dir: /data/lv\nworkers: 4\nmax_retries: 0\n")?;

        let config = LogsViewerConfig::load(&path).await?;
        assert_eq!(*config.get_workers(), 4);
        assert_eq!(*config.get_max_retries(), 0);
        assert_eq!(*config.get_store_timeout_ms(), DEFAULT_STORE_TIMEOUT_MS);
        assert_eq!(config.home_dir(), PathBuf::from("/data/lv"));

        let options = config.store_options();
        assert_eq!(options.max_retries, 0);
        assert_eq!(options.backoff_base, Duration::from_millis(DEFAULT_BACKOFF_BASE_MS));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_settings() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;

        let zero_workers = temp_dir.path().join("zero.yaml");
        std::fs::write(&zero_workers, "workers: 0\n")?;
        assert!(matches!(
            LogsViewerConfig::load(&zero_workers).await,
            Err(LogsViewerError::InvalidArgument(_))
        ));

        let unknown = temp_dir.path().join("unknown.yaml");
        std::fs::write(&unknown, "wrokers: 2\n")?;
        assert!(matches!(
            LogsViewerConfig::load(&unknown).await,
            Err(LogsViewerError::Yaml(_))
        ));
        Ok(())
    }
}
