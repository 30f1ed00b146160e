//! The update visitor: applies changesets and records their outcome.
//!
//! For every changeset the visitor
//!
//! 1. opens a diagnostic span carrying the changeset identity,
//! 2. asks the should-run filter whether the changeset is accepted,
//! 3. regenerates a stale stored checksum at the current version,
//! 4. executes accepted changesets, or writes the upgraded checksum to the
//!    history for rejected ones,
//! 5. commits once.
//!
//! ```rust,ignore
//! use shiftlog_migrate::{ChangeLogIterator, UpdateVisitor};
//!
//! let visitor = UpdateVisitor::new(executors, histories)
//!     .with_listener(listener)
//!     .with_should_run_filter(filter);
//!
//! ChangeLogIterator::new().run(&mut changelog, &visitor, &database).await?;
//! ```

use std::sync::Arc;

use tracing::{Instrument, Span, debug, info};

use crate::changelog::{ChangeSetVisitor, DatabaseChangeLog, Direction};
use crate::changeset::{ChangeSet, ExecType, RunStatus};
use crate::checksum::{Checksum, ChecksumVersions};
use crate::config::UpdateConfig;
use crate::database::Database;
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{ExecutorService, SqlStatement};
use crate::filter::{ChangeSetFilter, ChangeSetFilterResult};
use crate::history::HistoryServiceFactory;
use crate::listener::ChangeExecListener;
use crate::mdc;
use crate::ui::{ConsoleUiService, SilentUiService, UiService};

/// Forward visitor that executes changesets against a database.
pub struct UpdateVisitor {
    executors: Arc<ExecutorService>,
    histories: Arc<HistoryServiceFactory>,
    listener: Option<Arc<dyn ChangeExecListener>>,
    should_run: Option<Arc<dyn ChangeSetFilter>>,
    ui: Arc<dyn UiService>,
    checksum_versions: ChecksumVersions,
    restore_quoting_on_failure: bool,
}

impl std::fmt::Debug for UpdateVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateVisitor")
            .field("executors", &self.executors)
            .field("has_listener", &self.listener.is_some())
            .field("has_should_run_filter", &self.should_run.is_some())
            .field("checksum_versions", &self.checksum_versions)
            .field("restore_quoting_on_failure", &self.restore_quoting_on_failure)
            .finish()
    }
}

impl UpdateVisitor {
    /// Create a visitor with no listener and no should-run filter.
    ///
    /// Without a filter every changeset is treated as accepted.
    pub fn new(executors: Arc<ExecutorService>, histories: Arc<HistoryServiceFactory>) -> Self {
        Self {
            executors,
            histories,
            listener: None,
            should_run: None,
            ui: Arc::new(ConsoleUiService),
            checksum_versions: ChecksumVersions::default(),
            restore_quoting_on_failure: true,
        }
    }

    /// Create a visitor from configuration.
    pub fn from_config(
        config: &UpdateConfig,
        executors: Arc<ExecutorService>,
        histories: Arc<HistoryServiceFactory>,
    ) -> MigrateResult<Self> {
        if executors.primary_name() != config.primary_executor {
            return Err(MigrationError::config(format!(
                "executor service resolves '{}' but configuration names '{}'",
                executors.primary_name(),
                config.primary_executor
            )));
        }

        let ui: Arc<dyn UiService> = if config.show_progress {
            Arc::new(ConsoleUiService)
        } else {
            Arc::new(SilentUiService)
        };

        Ok(Self::new(executors, histories)
            .with_ui(ui)
            .with_checksum_versions(config.checksum_versions()?)
            .restore_quoting_on_failure(config.restore_quoting_on_failure))
    }

    /// Notify `listener` of execution events.
    pub fn with_listener(mut self, listener: Arc<dyn ChangeExecListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Decide acceptance with `filter`.
    pub fn with_should_run_filter(mut self, filter: Arc<dyn ChangeSetFilter>) -> Self {
        self.should_run = Some(filter);
        self
    }

    /// Send progress lines to `ui`.
    pub fn with_ui(mut self, ui: Arc<dyn UiService>) -> Self {
        self.ui = ui;
        self
    }

    /// Resolve the current checksum version with `versions`.
    pub fn with_checksum_versions(mut self, versions: ChecksumVersions) -> Self {
        self.checksum_versions = versions;
        self
    }

    /// Whether a failed changeset still restores the quoting strategy.
    pub fn restore_quoting_on_failure(mut self, restore: bool) -> Self {
        self.restore_quoting_on_failure = restore;
        self
    }

    /// Accept, reconcile the checksum, then execute or write the checksum.
    ///
    /// A rejected changeset whose stored checksum is already current is left
    /// alone apart from the commit.
    async fn process(
        &self,
        changeset: &mut ChangeSet,
        changelog: &DatabaseChangeLog,
        database: &dyn Database,
        span: &Span,
    ) -> MigrateResult<()> {
        let accepted = self
            .should_run
            .as_ref()
            .is_none_or(|filter| filter.accepts(changeset).accepted);

        let old_checksum = self.update_checksum_if_required(changeset)?;

        if accepted {
            self.execute_accepted_change(changeset, changelog, database, span)
                .await?;
        } else if old_checksum.is_some() || changeset.stored_checksum().is_none() {
            self.upgrade_checksum(changeset, database, old_checksum)
                .await?;
        }

        database.commit().await
    }

    /// Regenerate a stale stored checksum, returning the replaced one.
    fn update_checksum_if_required(
        &self,
        changeset: &mut ChangeSet,
    ) -> MigrateResult<Option<Checksum>> {
        let Some(stored) = changeset.stored_checksum() else {
            return Ok(None);
        };
        if !self.checksum_versions.is_stale(stored) {
            return Ok(None);
        }

        let old = stored.clone();
        changeset.clear_checksum();
        let upgraded = changeset.generate_checksum(self.checksum_versions.latest())?;
        debug!(from = %old, to = %upgraded, "Regenerated stale checksum");
        changeset.set_stored_checksum(Some(upgraded));
        Ok(Some(old))
    }

    /// Write the current checksum of a changeset that is not executed.
    async fn upgrade_checksum(
        &self,
        changeset: &mut ChangeSet,
        database: &dyn Database,
        old_checksum: Option<Checksum>,
    ) -> MigrateResult<()> {
        let checksum = match changeset.stored_checksum() {
            Some(checksum) => checksum.clone(),
            None => {
                let checksum = changeset.generate_checksum(self.checksum_versions.latest())?;
                changeset.set_stored_checksum(Some(checksum.clone()));
                checksum
            }
        };

        let executor = self.executors.primary(database)?;
        let from = old_checksum
            .as_ref()
            .map_or_else(|| "<null>".to_string(), ToString::to_string);

        if !executor.is_dry_run() {
            self.ui.send_message(&format!(
                "Upgrading checksum for Changeset {} from {} to {}.",
                changeset, from, checksum
            ));
        }
        info!(from = %from, to = %checksum, "Upgrading checksum");

        executor
            .execute(&SqlStatement::update_checksum(changeset, checksum))
            .await
    }

    async fn execute_accepted_change(
        &self,
        changeset: &mut ChangeSet,
        changelog: &DatabaseChangeLog,
        database: &dyn Database,
        span: &Span,
    ) -> MigrateResult<()> {
        let previous_strategy = database.object_quoting_strategy();

        let executor = self.executors.primary(database)?;
        if !executor.is_dry_run() {
            self.ui
                .send_message(&format!("Running Changeset: {}", changeset));
        }

        let run_status = database.run_status(changeset).await?;
        debug!(run_status = ?run_status, "Running Changeset: {}", changeset);
        self.fire_will_run(changeset, changelog, database, run_status)?;

        let exec_type = match changeset
            .execute(changelog, self.listener.as_deref(), database, &self.executors)
            .await
        {
            Ok(exec_type) => exec_type,
            Err(err) => {
                if self.restore_quoting_on_failure {
                    database.set_object_quoting_strategy(previous_strategy);
                }
                self.fire_run_failed(changeset, changelog, database, &err)?;
                return Err(err);
            }
        };

        let exec_type = if run_status != RunStatus::NotRan && exec_type == ExecType::Executed {
            ExecType::Reran
        } else {
            exec_type
        };

        self.fire_ran(changeset, changelog, database, exec_type)?;

        let deployment_id = self.histories.history_service(database)?.deployment_id();
        mdc::record_outcome(changeset, span, exec_type, deployment_id);

        database.set_object_quoting_strategy(previous_strategy);
        database
            .mark_change_set_exec_status(changeset, exec_type)
            .await
    }

    fn fire_will_run(
        &self,
        changeset: &ChangeSet,
        changelog: &DatabaseChangeLog,
        database: &dyn Database,
        run_status: RunStatus,
    ) -> MigrateResult<()> {
        match &self.listener {
            Some(listener) => listener.will_run(changeset, changelog, database, run_status),
            None => Ok(()),
        }
    }

    fn fire_ran(
        &self,
        changeset: &ChangeSet,
        changelog: &DatabaseChangeLog,
        database: &dyn Database,
        exec_type: ExecType,
    ) -> MigrateResult<()> {
        match &self.listener {
            Some(listener) => listener.ran(changeset, changelog, database, exec_type),
            None => Ok(()),
        }
    }

    fn fire_run_failed(
        &self,
        changeset: &ChangeSet,
        changelog: &DatabaseChangeLog,
        database: &dyn Database,
        error: &MigrationError,
    ) -> MigrateResult<()> {
        match &self.listener {
            Some(listener) => listener.run_failed(changeset, changelog, database, error),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ChangeSetVisitor for UpdateVisitor {
    fn direction(&self) -> Direction {
        Direction::Forward
    }

    async fn visit(
        &self,
        changeset: &mut ChangeSet,
        changelog: &DatabaseChangeLog,
        database: &dyn Database,
        _filter_results: &[ChangeSetFilterResult],
    ) -> MigrateResult<()> {
        let span = mdc::changeset_span(changeset);
        self.process(changeset, changelog, database, &span)
            .instrument(span.clone())
            .await
    }
}
