//! Statement executors.
//!
//! An [`Executor`] applies statements to a database. Executors come in two
//! flavours distinguished by [`Executor::is_dry_run`]: real executors change
//! the database, dry-run executors such as [`LoggingExecutor`] only record
//! what would have been sent.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::changeset::{ChangeSet, ExecType};
use crate::checksum::Checksum;
use crate::database::Database;
use crate::error::{MigrateResult, MigrationError};

/// Name of the executor that applies changesets.
pub const PRIMARY_EXECUTOR: &str = "sql";

/// Default name of the run history table.
pub const DEFAULT_HISTORY_TABLE: &str = "DATABASECHANGELOG";

/// A statement sent to an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlStatement {
    /// Literal SQL.
    Raw(String),
    /// Rewrite the checksum recorded for a changeset.
    UpdateChangeSetChecksum {
        /// Changeset id.
        id: String,
        /// Changeset author.
        author: String,
        /// Changelog path.
        file_path: String,
        /// New checksum.
        checksum: Checksum,
    },
    /// Record the outcome of a changeset in the run history.
    MarkChangeSetRan {
        /// Changeset id.
        id: String,
        /// Changeset author.
        author: String,
        /// Changelog path.
        file_path: String,
        /// Checksum of the applied content.
        checksum: Checksum,
        /// Recorded outcome.
        exec_type: ExecType,
        /// Deployment the outcome belongs to.
        deployment_id: Option<String>,
    },
}

impl SqlStatement {
    /// Create a literal SQL statement.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// Create a checksum update for `changeset`.
    pub fn update_checksum(changeset: &ChangeSet, checksum: Checksum) -> Self {
        Self::UpdateChangeSetChecksum {
            id: changeset.id().to_string(),
            author: changeset.author().to_string(),
            file_path: changeset.file_path().to_string(),
            checksum,
        }
    }

    /// Create a history write recording `exec_type` for `changeset`.
    pub fn mark_ran(
        changeset: &ChangeSet,
        checksum: Checksum,
        exec_type: ExecType,
        deployment_id: Option<String>,
    ) -> Self {
        Self::MarkChangeSetRan {
            id: changeset.id().to_string(),
            author: changeset.author().to_string(),
            file_path: changeset.file_path().to_string(),
            checksum,
            exec_type,
            deployment_id,
        }
    }

    /// Render as SQL text against the given history table.
    pub fn to_sql(&self, history_table: &str) -> String {
        match self {
            Self::Raw(sql) => sql.clone(),
            Self::UpdateChangeSetChecksum {
                id,
                author,
                file_path,
                checksum,
            } => format!(
                "UPDATE {} SET MD5SUM = '{}' WHERE ID = '{}' AND AUTHOR = '{}' AND FILENAME = '{}'",
                history_table,
                escape(&checksum.to_string()),
                escape(id),
                escape(author),
                escape(file_path)
            ),
            Self::MarkChangeSetRan {
                id,
                author,
                file_path,
                checksum,
                exec_type: ExecType::Reran,
                deployment_id,
            } => format!(
                "UPDATE {} SET DATEEXECUTED = CURRENT_TIMESTAMP, MD5SUM = '{}', EXECTYPE = 'RERAN', \
                 DEPLOYMENT_ID = {} WHERE ID = '{}' AND AUTHOR = '{}' AND FILENAME = '{}'",
                history_table,
                escape(&checksum.to_string()),
                literal(deployment_id.as_deref()),
                escape(id),
                escape(author),
                escape(file_path)
            ),
            Self::MarkChangeSetRan {
                id,
                author,
                file_path,
                checksum,
                exec_type,
                deployment_id,
            } => format!(
                "INSERT INTO {} (ID, AUTHOR, FILENAME, DATEEXECUTED, MD5SUM, EXECTYPE, DEPLOYMENT_ID) \
                 VALUES ('{}', '{}', '{}', CURRENT_TIMESTAMP, '{}', '{}', {})",
                history_table,
                escape(id),
                escape(author),
                escape(file_path),
                escape(&checksum.to_string()),
                exec_type.value(),
                literal(deployment_id.as_deref())
            ),
        }
    }
}

fn literal(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| format!("'{}'", escape(v)))
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Applies statements to a database.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Execute one statement.
    async fn execute(&self, statement: &SqlStatement) -> MigrateResult<()>;

    /// Whether this executor records statements instead of applying them.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Dry-run executor that records rendered SQL.
#[derive(Debug)]
pub struct LoggingExecutor {
    history_table: String,
    output: Mutex<Vec<String>>,
}

impl Default for LoggingExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_TABLE)
    }
}

impl LoggingExecutor {
    /// Create a logging executor rendering against `history_table`.
    pub fn new(history_table: impl Into<String>) -> Self {
        Self {
            history_table: history_table.into(),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Statements recorded so far, each terminated with `;`.
    pub fn output(&self) -> Vec<String> {
        self.output.lock().clone()
    }

    /// Recorded statements as one script.
    pub fn script(&self) -> String {
        self.output.lock().join("\n")
    }
}

#[async_trait::async_trait]
impl Executor for LoggingExecutor {
    async fn execute(&self, statement: &SqlStatement) -> MigrateResult<()> {
        let sql = statement.to_sql(&self.history_table);
        debug!(sql = %sql, "Recording statement");
        self.output.lock().push(format!("{};", sql));
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

/// Resolves executors by name and database.
pub struct ExecutorService {
    primary: String,
    executors: RwLock<HashMap<(String, String), Arc<dyn Executor>>>,
}

impl Default for ExecutorService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorService")
            .field("primary", &self.primary)
            .field("registered", &self.executors.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExecutorService {
    /// Create an empty registry using [`PRIMARY_EXECUTOR`].
    pub fn new() -> Self {
        Self {
            primary: PRIMARY_EXECUTOR.to_string(),
            executors: RwLock::new(HashMap::new()),
        }
    }

    /// Use a different name for the primary executor.
    pub fn with_primary(mut self, name: impl Into<String>) -> Self {
        self.primary = name.into();
        self
    }

    /// Name of the primary executor.
    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    /// Register `executor` under `name` for the database named `database`.
    ///
    /// Replaces any executor already registered there.
    pub fn register(
        &self,
        name: impl Into<String>,
        database: impl Into<String>,
        executor: Arc<dyn Executor>,
    ) {
        self.executors
            .write()
            .insert((name.into(), database.into()), executor);
    }

    /// Register `executor` as the primary executor for `database`.
    pub fn register_primary(&self, database: impl Into<String>, executor: Arc<dyn Executor>) {
        let name = self.primary.clone();
        self.register(name, database, executor);
    }

    /// Resolve the executor `name` for `database`.
    pub fn executor(&self, name: &str, database: &dyn Database) -> MigrateResult<Arc<dyn Executor>> {
        self.executors
            .read()
            .get(&(name.to_string(), database.name().to_string()))
            .cloned()
            .ok_or_else(|| MigrationError::ExecutorNotFound {
                executor: name.to_string(),
                database: database.name().to_string(),
            })
    }

    /// Resolve the primary executor for `database`.
    pub fn primary(&self, database: &dyn Database) -> MigrateResult<Arc<dyn Executor>> {
        self.executor(&self.primary, database)
    }
}
