//! Changesets: the unit of migration work.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::changelog::DatabaseChangeLog;
use crate::checksum::{Checksum, ChecksumVersion};
use crate::database::{Database, ObjectQuotingStrategy};
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{ExecutorService, SqlStatement};
use crate::listener::ChangeExecListener;

/// Prior outcome of a changeset as recorded in the run history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Never recorded.
    NotRan,
    /// Recorded with matching content.
    AlreadyRan,
    /// Recorded, content changed, and the changeset runs on change.
    Reran,
    /// Recorded as marked ran without executing.
    MarkRan,
    /// Recorded, content changed, and the changeset does not run on change.
    InvalidChecksum,
}

impl RunStatus {
    /// Whether the history holds any record of this changeset.
    pub fn has_run(self) -> bool {
        self != Self::NotRan
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecType {
    /// Applied, and not previously recorded.
    Executed,
    /// Application failed.
    Failed,
    /// Not applied; a precondition asked to continue past it.
    Skipped,
    /// Applied again on top of an earlier record.
    Reran,
    /// Recorded as applied without running.
    MarkRan,
}

impl ExecType {
    /// The value persisted in the history table.
    pub fn value(self) -> &'static str {
        match self {
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Reran => "RERAN",
            Self::MarkRan => "MARK_RAN",
        }
    }

    /// Whether this outcome gets a row in the history table.
    pub fn is_recorded(self) -> bool {
        !matches!(self, Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for ExecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// A single SQL change inside a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// SQL text, possibly holding several `;`-separated statements.
    pub sql: String,
    /// Optional human readable description.
    pub description: Option<String>,
    /// Whether to split `sql` on `;` into separate statements.
    pub split_statements: bool,
}

impl Change {
    /// Create a SQL change.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            description: None,
            split_statements: true,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Send `sql` as one statement.
    pub fn no_split(mut self) -> Self {
        self.split_statements = false;
        self
    }

    /// Statements this change executes.
    pub fn statements(&self) -> Vec<SqlStatement> {
        if !self.split_statements {
            return vec![SqlStatement::raw(self.sql.trim())];
        }

        self.sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SqlStatement::raw)
            .collect()
    }
}

/// What to do when a precondition does not hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionFailAction {
    /// Abort the run.
    #[default]
    Halt,
    /// Skip this changeset and try again next run.
    Continue,
    /// Record the changeset as ran without executing it.
    MarkRan,
    /// Log a warning and execute anyway.
    Warn,
}

/// A check evaluated against the database before a changeset executes.
#[async_trait::async_trait]
pub trait Precondition: Send + Sync {
    /// Name used in failure messages.
    fn name(&self) -> &str;

    /// Whether the precondition holds.
    async fn check(&self, database: &dyn Database, changeset: &ChangeSet) -> MigrateResult<bool>;
}

/// Preconditions attached to a changeset.
#[derive(Clone, Default)]
pub struct Preconditions {
    /// Action taken when a check fails.
    pub on_fail: PreconditionFailAction,
    /// Checks, evaluated in order.
    pub checks: Vec<Arc<dyn Precondition>>,
}

impl fmt::Debug for Preconditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preconditions")
            .field("on_fail", &self.on_fail)
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Preconditions {
    /// Create an empty precondition set.
    pub fn new(on_fail: PreconditionFailAction) -> Self {
        Self {
            on_fail,
            checks: Vec::new(),
        }
    }

    /// Add a check.
    pub fn with_check(mut self, check: impl Precondition + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Name of the first failing check, if any.
    async fn first_failure(
        &self,
        database: &dyn Database,
        changeset: &ChangeSet,
    ) -> MigrateResult<Option<String>> {
        for check in &self.checks {
            if !check.check(database, changeset).await? {
                return Ok(Some(check.name().to_string()));
            }
        }
        Ok(None)
    }
}

/// A unit of migration work.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    id: String,
    author: String,
    file_path: String,
    changes: Vec<Change>,
    run_on_change: bool,
    run_always: bool,
    object_quoting_strategy: Option<ObjectQuotingStrategy>,
    preconditions: Option<Preconditions>,
    stored_checksum: Option<Checksum>,
    attributes: HashMap<String, Value>,
}

impl ChangeSet {
    /// Create an empty changeset.
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            file_path: file_path.into(),
            changes: Vec::new(),
            run_on_change: false,
            run_always: false,
            object_quoting_strategy: None,
            preconditions: None,
            stored_checksum: None,
            attributes: HashMap::new(),
        }
    }

    /// Add a change.
    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    /// Re-run the changeset whenever its content changes.
    pub fn run_on_change(mut self, run_on_change: bool) -> Self {
        self.run_on_change = run_on_change;
        self
    }

    /// Run the changeset on every update.
    pub fn run_always(mut self, run_always: bool) -> Self {
        self.run_always = run_always;
        self
    }

    /// Quoting strategy applied to the database while this changeset runs.
    pub fn with_object_quoting_strategy(mut self, strategy: ObjectQuotingStrategy) -> Self {
        self.object_quoting_strategy = Some(strategy);
        self
    }

    /// Attach preconditions.
    pub fn with_preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = Some(preconditions);
        self
    }

    /// Set the checksum loaded from history.
    pub fn with_stored_checksum(mut self, checksum: Checksum) -> Self {
        self.stored_checksum = Some(checksum);
        self
    }

    /// Changeset id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Changeset author.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Logical path of the changelog declaring this changeset.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Changes in declaration order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Whether the changeset re-runs when its content changes.
    pub fn is_run_on_change(&self) -> bool {
        self.run_on_change
    }

    /// Whether the changeset runs on every update.
    pub fn is_run_always(&self) -> bool {
        self.run_always
    }

    /// Quoting strategy requested by the changeset.
    pub fn object_quoting_strategy(&self) -> Option<ObjectQuotingStrategy> {
        self.object_quoting_strategy
    }

    /// Checksum known to the history, if any.
    pub fn stored_checksum(&self) -> Option<&Checksum> {
        self.stored_checksum.as_ref()
    }

    /// Replace the stored checksum.
    pub fn set_stored_checksum(&mut self, checksum: Option<Checksum>) {
        self.stored_checksum = checksum;
    }

    /// Forget the stored checksum.
    pub fn clear_checksum(&mut self) {
        self.stored_checksum = None;
    }

    /// Compute the checksum of the current content with the given algorithm.
    pub fn generate_checksum(&self, version: ChecksumVersion) -> MigrateResult<Checksum> {
        let content = self
            .changes
            .iter()
            .map(|c| c.sql.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Checksum::compute(version, &content)
    }

    /// Set a diagnostic attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Get a diagnostic attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// All diagnostic attributes.
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Apply the changeset through the primary executor of `database`.
    ///
    /// Applies the changeset's quoting strategy to the database first; the
    /// caller is responsible for restoring it.
    pub async fn execute(
        &self,
        changelog: &DatabaseChangeLog,
        listener: Option<&dyn ChangeExecListener>,
        database: &dyn Database,
        executors: &ExecutorService,
    ) -> MigrateResult<ExecType> {
        if let Some(strategy) = self.object_quoting_strategy {
            database.set_object_quoting_strategy(strategy);
        }

        if let Some(preconditions) = &self.preconditions {
            let failure = preconditions
                .first_failure(database, self)
                .await
                .map_err(|e| MigrationError::migration_failed(self, e))?;

            if let Some(check) = failure {
                if let Some(listener) = listener {
                    listener
                        .precondition_failed(self, changelog, preconditions.on_fail)
                        .map_err(|e| MigrationError::migration_failed(self, e))?;
                }
                match preconditions.on_fail {
                    PreconditionFailAction::Halt => {
                        return Err(MigrationError::migration_failed(
                            self,
                            MigrationError::PreconditionFailed {
                                changeset: self.to_string(),
                                message: format!("'{}' did not hold", check),
                            },
                        ));
                    }
                    PreconditionFailAction::Continue => {
                        debug!(changeset = %self, check = %check, "Precondition failed, skipping");
                        return Ok(ExecType::Skipped);
                    }
                    PreconditionFailAction::MarkRan => {
                        debug!(changeset = %self, check = %check, "Precondition failed, marking ran");
                        return Ok(ExecType::MarkRan);
                    }
                    PreconditionFailAction::Warn => {
                        warn!(changeset = %self, check = %check, "Precondition failed, running anyway");
                    }
                }
            }
        }

        let executor = executors
            .primary(database)
            .map_err(|e| MigrationError::migration_failed(self, e))?;

        if self.changes.is_empty() {
            debug!(changeset = %self, changelog = %changelog.physical_path(), "Changeset has no changes");
        }

        for change in &self.changes {
            for statement in change.statements() {
                executor
                    .execute(&statement)
                    .await
                    .map_err(|e| MigrationError::migration_failed(self, e))?;
            }
        }

        Ok(ExecType::Executed)
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.file_path, self.id, self.author)
    }
}
