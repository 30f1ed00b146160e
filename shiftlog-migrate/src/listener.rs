//! Execution lifecycle notifications.

use crate::changelog::DatabaseChangeLog;
use crate::changeset::{ChangeSet, ExecType, PreconditionFailAction, RunStatus};
use crate::database::Database;
use crate::error::{MigrateResult, MigrationError};

/// Observer of changeset execution.
///
/// Every method defaults to doing nothing. An error returned from any method
/// aborts the run like an execution failure would.
pub trait ChangeExecListener: Send + Sync {
    /// Called before a changeset is applied.
    fn will_run(
        &self,
        _changeset: &ChangeSet,
        _changelog: &DatabaseChangeLog,
        _database: &dyn Database,
        _run_status: RunStatus,
    ) -> MigrateResult<()> {
        Ok(())
    }

    /// Called after a changeset was applied.
    fn ran(
        &self,
        _changeset: &ChangeSet,
        _changelog: &DatabaseChangeLog,
        _database: &dyn Database,
        _exec_type: ExecType,
    ) -> MigrateResult<()> {
        Ok(())
    }

    /// Called when applying a changeset failed, before the error propagates.
    fn run_failed(
        &self,
        _changeset: &ChangeSet,
        _changelog: &DatabaseChangeLog,
        _database: &dyn Database,
        _error: &MigrationError,
    ) -> MigrateResult<()> {
        Ok(())
    }

    /// Called when a precondition of a changeset did not hold.
    fn precondition_failed(
        &self,
        _changeset: &ChangeSet,
        _changelog: &DatabaseChangeLog,
        _on_fail: PreconditionFailAction,
    ) -> MigrateResult<()> {
        Ok(())
    }
}
