//! In-memory database backend.
//!
//! Implements [`Database`], [`Executor`] and [`ChangeLogHistoryService`] over
//! shared in-process state. Useful for tests and for embedding the engine
//! where the history lives in memory.
//!
//! History writes are statements like any other: they go through the primary
//! executor of the database's executor registry, so registering a dry-run
//! executor there leaves the history untouched.
//!
//! ```rust
//! use shiftlog_migrate::memory::InMemoryDatabase;
//!
//! let db = InMemoryDatabase::new("memory");
//! let executors = db.executor_service();
//! db.fail_on("DROP TABLE");
//! assert!(db.applied_sql().is_empty());
//! # let _ = executors;
//! ```

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::changeset::{ChangeSet, ExecType, RunStatus};
use crate::checksum::{Checksum, ChecksumVersions};
use crate::database::{Database, ObjectQuotingStrategy};
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{Executor, ExecutorService, SqlStatement};
use crate::history::{ChangeLogHistoryService, RanChangeSet, new_deployment_id};

type ChangeSetKey = (String, String, String);

fn key_of(changeset: &ChangeSet) -> ChangeSetKey {
    (
        changeset.file_path().to_string(),
        changeset.id().to_string(),
        changeset.author().to_string(),
    )
}

#[derive(Debug, Default)]
struct State {
    ran: IndexMap<ChangeSetKey, RanChangeSet>,
    applied: Vec<String>,
    executed: Vec<SqlStatement>,
    fail_patterns: Vec<String>,
    commits: usize,
    quoting: ObjectQuotingStrategy,
    deployment_id: Option<String>,
}

impl State {
    fn next_order(&self) -> u64 {
        self.ran
            .values()
            .map(|r| r.order_executed)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn upsert(
        &mut self,
        key: ChangeSetKey,
        checksum: Option<Checksum>,
        exec_type: ExecType,
        deployment_id: Option<String>,
    ) {
        let order = match self.ran.get(&key) {
            Some(existing) => existing.order_executed,
            None => self.next_order(),
        };
        let (file_path, id, author) = key.clone();
        let record = RanChangeSet {
            id,
            author,
            file_path,
            last_checksum: checksum,
            date_executed: Utc::now(),
            exec_type,
            order_executed: order,
            deployment_id,
        };
        self.ran.insert(key, record);
    }
}

/// A database whose history and applied statements live in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    name: String,
    checksum_versions: ChecksumVersions,
    state: Arc<Mutex<State>>,
    executors: Arc<ExecutorService>,
}

impl InMemoryDatabase {
    /// Create an empty database with [`Self::executor`] as primary executor.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let state = Arc::new(Mutex::new(State::default()));
        let executors = ExecutorService::new();
        executors.register_primary(
            name.clone(),
            Arc::new(InMemoryExecutor {
                state: Arc::clone(&state),
            }),
        );

        Self {
            name,
            checksum_versions: ChecksumVersions::default(),
            state,
            executors: Arc::new(executors),
        }
    }

    /// Checksum version used when recording changesets without a checksum.
    pub fn with_checksum_versions(mut self, versions: ChecksumVersions) -> Self {
        self.checksum_versions = versions;
        self
    }

    /// Route history writes through `executors` instead of the built-in registry.
    pub fn with_executor_service(mut self, executors: Arc<ExecutorService>) -> Self {
        self.executors = executors;
        self
    }

    /// The real executor for this database.
    pub fn executor(&self) -> Arc<InMemoryExecutor> {
        Arc::new(InMemoryExecutor {
            state: Arc::clone(&self.state),
        })
    }

    /// The executor registry this database writes its history through.
    ///
    /// Changes made to the returned registry, such as registering a dry-run
    /// primary executor, apply to the history writes as well.
    pub fn executor_service(&self) -> Arc<ExecutorService> {
        Arc::clone(&self.executors)
    }

    /// The history service for this database.
    pub fn history_service(&self) -> Arc<InMemoryHistoryService> {
        Arc::new(InMemoryHistoryService {
            state: Arc::clone(&self.state),
        })
    }

    /// Make statements containing `pattern` fail.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.state.lock().fail_patterns.push(pattern.into());
    }

    /// SQL applied so far, in order.
    pub fn applied_sql(&self) -> Vec<String> {
        self.state.lock().applied.clone()
    }

    /// Every statement executed so far, including history writes.
    pub fn executed_statements(&self) -> Vec<SqlStatement> {
        self.state.lock().executed.clone()
    }

    /// Number of commits.
    pub fn commit_count(&self) -> usize {
        self.state.lock().commits
    }

    /// Seed the history with a record for `changeset`.
    pub fn record_ran(&self, changeset: &ChangeSet, checksum: Option<Checksum>, exec_type: ExecType) {
        let mut state = self.state.lock();
        let deployment_id = state.deployment_id.clone();
        state.upsert(key_of(changeset), checksum, exec_type, deployment_id);
    }

    /// Recorded exec type of `changeset`.
    pub fn exec_type_of(&self, changeset: &ChangeSet) -> Option<ExecType> {
        self.state
            .lock()
            .ran
            .get(&key_of(changeset))
            .map(|r| r.exec_type)
    }

    /// Recorded checksum of `changeset`.
    pub fn recorded_checksum(&self, changeset: &ChangeSet) -> Option<Checksum> {
        self.state
            .lock()
            .ran
            .get(&key_of(changeset))
            .and_then(|r| r.last_checksum.clone())
    }
}

#[async_trait::async_trait]
impl Database for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_status(&self, changeset: &ChangeSet) -> MigrateResult<RunStatus> {
        let record = self.state.lock().ran.get(&key_of(changeset)).cloned();
        let Some(record) = record else {
            return Ok(RunStatus::NotRan);
        };

        if record.exec_type == ExecType::MarkRan {
            return Ok(RunStatus::MarkRan);
        }

        let Some(recorded) = record.last_checksum else {
            return Ok(RunStatus::AlreadyRan);
        };

        let current = changeset
            .generate_checksum(recorded.version())
            .map_err(|e| MigrationError::history(format!("cannot verify {}: {}", changeset, e)))?;

        Ok(if current == recorded {
            RunStatus::AlreadyRan
        } else if changeset.is_run_on_change() {
            RunStatus::Reran
        } else {
            RunStatus::InvalidChecksum
        })
    }

    async fn commit(&self) -> MigrateResult<()> {
        self.state.lock().commits += 1;
        Ok(())
    }

    fn object_quoting_strategy(&self) -> ObjectQuotingStrategy {
        self.state.lock().quoting
    }

    fn set_object_quoting_strategy(&self, strategy: ObjectQuotingStrategy) {
        self.state.lock().quoting = strategy;
    }

    async fn mark_change_set_exec_status(
        &self,
        changeset: &ChangeSet,
        exec_type: ExecType,
    ) -> MigrateResult<()> {
        if !exec_type.is_recorded() {
            return Ok(());
        }

        let checksum = match changeset.stored_checksum() {
            Some(checksum) => checksum.clone(),
            None => changeset.generate_checksum(self.checksum_versions.latest())?,
        };

        let deployment_id = self.state.lock().deployment_id.clone();
        let executor = self.executors.primary(self)?;
        executor
            .execute(&SqlStatement::mark_ran(changeset, checksum, exec_type, deployment_id))
            .await
    }
}

/// Real executor applying statements to an [`InMemoryDatabase`].
#[derive(Debug)]
pub struct InMemoryExecutor {
    state: Arc<Mutex<State>>,
}

#[async_trait::async_trait]
impl Executor for InMemoryExecutor {
    async fn execute(&self, statement: &SqlStatement) -> MigrateResult<()> {
        let mut state = self.state.lock();

        match statement {
            SqlStatement::Raw(sql) => {
                if let Some(pattern) = state.fail_patterns.iter().find(|p| sql.contains(p.as_str())) {
                    return Err(MigrationError::database(format!(
                        "statement rejected ({}): {}",
                        pattern, sql
                    )));
                }
                trace!(sql = %sql, "Applying statement");
                state.applied.push(sql.clone());
            }
            SqlStatement::UpdateChangeSetChecksum {
                id,
                author,
                file_path,
                checksum,
            } => {
                let key = (file_path.clone(), id.clone(), author.clone());
                if let Some(record) = state.ran.get_mut(&key) {
                    record.last_checksum = Some(checksum.clone());
                }
            }
            SqlStatement::MarkChangeSetRan {
                id,
                author,
                file_path,
                checksum,
                exec_type,
                deployment_id,
            } => {
                let key = (file_path.clone(), id.clone(), author.clone());
                state.upsert(key, Some(checksum.clone()), *exec_type, deployment_id.clone());
            }
        }

        state.executed.push(statement.clone());
        Ok(())
    }
}

/// History service over an [`InMemoryDatabase`].
#[derive(Debug)]
pub struct InMemoryHistoryService {
    state: Arc<Mutex<State>>,
}

#[async_trait::async_trait]
impl ChangeLogHistoryService for InMemoryHistoryService {
    fn deployment_id(&self) -> Option<String> {
        self.state.lock().deployment_id.clone()
    }

    fn generate_deployment_id(&self) {
        let mut state = self.state.lock();
        if state.deployment_id.is_none() {
            state.deployment_id = Some(new_deployment_id());
        }
    }

    fn reset_deployment_id(&self) {
        self.state.lock().deployment_id = None;
    }

    async fn ran_change_sets(&self) -> MigrateResult<Vec<RanChangeSet>> {
        let mut ran: Vec<_> = self.state.lock().ran.values().cloned().collect();
        ran.sort_by_key(|r| r.order_executed);
        Ok(ran)
    }
}
