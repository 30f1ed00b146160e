//! Configuration for changelog updates.
//!
//! ```toml
//! primary_executor = "sql"
//! checksum_version = 2
//! show_progress = true
//! restore_quoting_on_failure = true
//! history_table = "DATABASECHANGELOG"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::checksum::{ChecksumVersion, ChecksumVersions};
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{DEFAULT_HISTORY_TABLE, ExecutorService, LoggingExecutor, PRIMARY_EXECUTOR};

/// Settings for the update visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Name of the executor changesets run through.
    pub primary_executor: String,
    /// Pin the current checksum version; newest supported when unset.
    pub checksum_version: Option<u32>,
    /// Whether to print progress lines for the operator.
    pub show_progress: bool,
    /// Whether to restore the quoting strategy when a changeset fails.
    pub restore_quoting_on_failure: bool,
    /// Name of the run history table.
    pub history_table: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            primary_executor: PRIMARY_EXECUTOR.to_string(),
            checksum_version: None,
            show_progress: true,
            restore_quoting_on_failure: true,
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
        }
    }
}

impl UpdateConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MigrationError::config(format!("Failed to parse TOML: {}", e)))?;
        config.checksum_versions()?;
        Ok(config)
    }

    /// Set the primary executor name.
    pub fn primary_executor(mut self, name: impl Into<String>) -> Self {
        self.primary_executor = name.into();
        self
    }

    /// Pin the checksum version.
    pub fn checksum_version(mut self, version: u32) -> Self {
        self.checksum_version = Some(version);
        self
    }

    /// Enable or disable progress lines.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Enable or disable quoting restoration on failure.
    pub fn restore_quoting_on_failure(mut self, restore: bool) -> Self {
        self.restore_quoting_on_failure = restore;
        self
    }

    /// Set the history table name.
    pub fn history_table(mut self, table: impl Into<String>) -> Self {
        self.history_table = table.into();
        self
    }

    /// Checksum version resolution for this configuration.
    pub fn checksum_versions(&self) -> MigrateResult<ChecksumVersions> {
        match self.checksum_version {
            Some(version) => ChecksumVersions::pinned(ChecksumVersion::new(version)),
            None => Ok(ChecksumVersions::default()),
        }
    }

    /// An empty executor registry using the configured primary executor name.
    pub fn executor_service(&self) -> ExecutorService {
        ExecutorService::new().with_primary(self.primary_executor.clone())
    }

    /// A dry-run executor rendering against the configured history table.
    pub fn logging_executor(&self) -> LoggingExecutor {
        LoggingExecutor::new(self.history_table.clone())
    }
}
