//! Error types for the changeset execution core.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur while executing a changelog.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Error reading or writing the run history.
    #[error("History error: {0}")]
    History(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A changeset could not be applied.
    #[error("Migration failed for changeset {changeset}: {source}")]
    MigrationFailed {
        /// Changeset identity (`path::id::author`).
        changeset: String,
        /// Underlying cause.
        #[source]
        source: Box<MigrationError>,
    },

    /// A changeset precondition failed with `on_fail = halt`.
    #[error("Preconditions failed for changeset {changeset}: {message}")]
    PreconditionFailed {
        /// Changeset identity.
        changeset: String,
        /// Failure message.
        message: String,
    },

    /// A checksum string could not be parsed.
    #[error("Invalid checksum '{0}'")]
    InvalidChecksum(String),

    /// No checksum algorithm is known for this version.
    #[error("Unsupported checksum version {0}")]
    UnsupportedChecksumVersion(u32),

    /// No executor registered under the name for the database.
    #[error("No executor '{executor}' registered for database '{database}'")]
    ExecutorNotFound {
        /// Executor name.
        executor: String,
        /// Database name.
        database: String,
    },

    /// No history service registered for the database.
    #[error("No history service registered for database '{0}'")]
    HistoryServiceNotFound(String),

    /// An execution listener failed.
    #[error("Listener error: {0}")]
    Listener(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a history error.
    pub fn history(msg: impl Into<String>) -> Self {
        Self::History(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a listener error.
    pub fn listener(msg: impl Into<String>) -> Self {
        Self::Listener(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Wrap a cause as the failure of a specific changeset.
    pub fn migration_failed(changeset: impl ToString, source: MigrationError) -> Self {
        Self::MigrationFailed {
            changeset: changeset.to_string(),
            source: Box::new(source),
        }
    }

    /// Check if this error is a changeset application failure.
    pub fn is_migration_failure(&self) -> bool {
        matches!(
            self,
            Self::MigrationFailed { .. } | Self::PreconditionFailed { .. }
        )
    }
}
