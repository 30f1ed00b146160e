//! Integration tests for changelog updates.
//!
//! These tests walk whole changelogs through the update visitor against the
//! in-memory backend and check what ends up applied and recorded.

use std::sync::Arc;

use recording::Events;
use pretty_assertions::assert_eq;
use shiftlog::migrate::{
    BufferedUiService, InMemoryDatabase, InMemoryHistoryService, LoggingExecutor,
};
use shiftlog::prelude::*;

mod recording {
    use parking_lot::Mutex;

    use shiftlog::prelude::*;

    /// Listener recording lifecycle events as strings.
    #[derive(Default)]
    pub struct Events {
        events: Mutex<Vec<String>>,
        changelog_sizes: Mutex<Vec<usize>>,
    }

    impl Events {
        pub fn all(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        /// Size of the changelog handed to each `will_run`.
        pub fn changelog_sizes(&self) -> Vec<usize> {
            self.changelog_sizes.lock().clone()
        }
    }

    impl ChangeExecListener for Events {
        fn will_run(
            &self,
            changeset: &ChangeSet,
            changelog: &DatabaseChangeLog,
            _: &dyn Database,
            run_status: RunStatus,
        ) -> MigrateResult<()> {
            self.changelog_sizes.lock().push(changelog.change_sets().len());
            self.events
                .lock()
                .push(format!("will_run {} {:?}", changeset.id(), run_status));
            Ok(())
        }

        fn ran(
            &self,
            changeset: &ChangeSet,
            _: &DatabaseChangeLog,
            _: &dyn Database,
            exec_type: ExecType,
        ) -> MigrateResult<()> {
            self.events
                .lock()
                .push(format!("ran {} {}", changeset.id(), exec_type));
            Ok(())
        }

        fn run_failed(
            &self,
            changeset: &ChangeSet,
            _: &DatabaseChangeLog,
            _: &dyn Database,
            _: &MigrationError,
        ) -> MigrateResult<()> {
            self.events
                .lock()
                .push(format!("run_failed {}", changeset.id()));
            Ok(())
        }
    }
}

const PATH: &str = "db/changelog.sql";

struct Harness {
    db: InMemoryDatabase,
    history: Arc<InMemoryHistoryService>,
    executors: Arc<ExecutorService>,
    histories: Arc<HistoryServiceFactory>,
    events: Arc<Events>,
    ui: Arc<BufferedUiService>,
}

impl Harness {
    fn new() -> Self {
        let db = InMemoryDatabase::new("app");
        let history = db.history_service();
        let histories = Arc::new(HistoryServiceFactory::new());
        histories.register("app", history.clone());

        Self {
            executors: db.executor_service(),
            db,
            history,
            histories,
            events: Arc::new(Events::default()),
            ui: Arc::new(BufferedUiService::new()),
        }
    }

    fn visitor(&self) -> UpdateVisitor {
        UpdateVisitor::new(self.executors.clone(), self.histories.clone())
            .with_listener(self.events.clone())
            .with_ui(self.ui.clone())
    }

    /// Visitor accepting changesets that have not run or that run on change.
    fn should_run_visitor(&self) -> UpdateVisitor {
        let db = self.db.clone();
        self.visitor()
            .with_should_run_filter(Arc::new(move |cs: &ChangeSet| {
                let recorded = db.exec_type_of(cs).is_some();
                if !recorded {
                    ChangeSetFilterResult::accept("changeset has not run yet")
                } else if cs.is_run_on_change() || cs.is_run_always() {
                    ChangeSetFilterResult::accept("changeset runs again")
                } else {
                    ChangeSetFilterResult::reject("changeset already ran")
                }
            }))
    }

    async fn update(&self, visitor: &UpdateVisitor, changelog: &mut DatabaseChangeLog) -> MigrateResult<()> {
        self.history.reset_deployment_id();
        self.history.generate_deployment_id();
        ChangeLogIterator::new().run(changelog, visitor, &self.db).await
    }
}

fn changeset(id: &str, sql: &str) -> ChangeSet {
    ChangeSet::new(id, "alice", PATH).with_change(Change::sql(sql))
}

fn changelog(change_sets: Vec<ChangeSet>) -> DatabaseChangeLog {
    change_sets
        .into_iter()
        .fold(DatabaseChangeLog::new(PATH), DatabaseChangeLog::with_change_set)
}

#[tokio::test]
async fn test_fresh_changelog_applies_everything_once() {
    let h = Harness::new();
    let mut log = changelog(vec![
        changeset("1", "CREATE TABLE users (id INT)"),
        changeset("2", "CREATE TABLE posts (id INT)"),
    ]);

    h.update(&h.should_run_visitor(), &mut log).await.unwrap();

    assert_eq!(
        h.db.applied_sql(),
        vec!["CREATE TABLE users (id INT)", "CREATE TABLE posts (id INT)"]
    );
    assert_eq!(h.db.commit_count(), 2);
    assert_eq!(
        h.events.all(),
        vec![
            "will_run 1 NotRan",
            "ran 1 EXECUTED",
            "will_run 2 NotRan",
            "ran 2 EXECUTED",
        ]
    );

    assert_eq!(h.events.changelog_sizes(), vec![2, 2]);

    let ran = h.history.ran_change_sets().await.unwrap();
    assert_eq!(ran.len(), 2);
    assert!(ran.iter().all(|r| r.deployment_id == h.history.deployment_id()));

    let record = serde_json::to_value(&ran[1]).unwrap();
    assert_eq!(record["id"], "2");
    assert_eq!(record["exec_type"], "EXECUTED");
    assert_eq!(record["order_executed"], 2);
    assert!(record["last_checksum"].as_str().unwrap().starts_with("2:"));
}

#[tokio::test]
async fn test_second_update_is_idempotent() {
    let h = Harness::new();
    let mut log = changelog(vec![changeset("1", "CREATE TABLE users (id INT)")]);

    h.update(&h.should_run_visitor(), &mut log).await.unwrap();
    h.update(&h.should_run_visitor(), &mut log).await.unwrap();

    assert_eq!(h.db.applied_sql().len(), 1);
    assert_eq!(h.db.commit_count(), 2);
    assert_eq!(h.events.all().len(), 2);
}

#[tokio::test]
async fn test_run_on_change_reruns_modified_changeset() {
    let h = Harness::new();
    let mut log = changelog(vec![
        changeset("view", "CREATE VIEW v AS SELECT 1").run_on_change(true),
    ]);
    h.update(&h.should_run_visitor(), &mut log).await.unwrap();

    let mut log = changelog(vec![
        changeset("view", "CREATE OR REPLACE VIEW v AS SELECT 2").run_on_change(true),
    ]);
    h.update(&h.should_run_visitor(), &mut log).await.unwrap();

    assert_eq!(h.db.applied_sql().len(), 2);
    assert_eq!(
        h.events.all()[2..].to_vec(),
        vec!["will_run view Reran", "ran view RERAN"]
    );
    assert_eq!(h.db.exec_type_of(&log.change_sets()[0]), Some(ExecType::Reran));
}

#[tokio::test]
async fn test_failure_halts_walk_and_keeps_prior_commits() {
    let h = Harness::new();
    h.db.fail_on("BROKEN");
    let mut log = changelog(vec![
        changeset("1", "CREATE TABLE users (id INT)"),
        changeset("2", "BROKEN STATEMENT"),
        changeset("3", "CREATE TABLE posts (id INT)"),
    ]);

    let err = h.update(&h.should_run_visitor(), &mut log).await.unwrap_err();

    assert!(err.is_migration_failure());
    assert!(err.to_string().contains("db/changelog.sql::2::alice"));
    assert_eq!(h.db.applied_sql(), vec!["CREATE TABLE users (id INT)"]);
    assert_eq!(h.db.commit_count(), 1);
    assert_eq!(
        h.events.all(),
        vec![
            "will_run 1 NotRan",
            "ran 1 EXECUTED",
            "will_run 2 NotRan",
            "run_failed 2",
        ]
    );
    assert_eq!(h.db.exec_type_of(&log.change_sets()[1]), None);
    assert_eq!(h.db.exec_type_of(&log.change_sets()[2]), None);
}

#[tokio::test]
async fn test_checksum_upgrade_after_algorithm_change() {
    let h = Harness::new();
    let log = changelog(vec![
        changeset("1", "CREATE TABLE users (\n  id INT\n)"),
        changeset("2", "CREATE TABLE posts (id INT)"),
    ]);

    // An earlier release recorded V1 checksums.
    for cs in log.change_sets() {
        h.db.record_ran(
            cs,
            Some(cs.generate_checksum(ChecksumVersion::V1).unwrap()),
            ExecType::Executed,
        );
    }

    // Second deployment loads the stored V1 checksums and upgrades them.
    let mut upgraded = changelog(
        log.change_sets()
            .iter()
            .map(|cs| {
                let stored = h.db.recorded_checksum(cs).unwrap();
                cs.clone().with_stored_checksum(stored)
            })
            .collect(),
    );
    h.update(&h.should_run_visitor(), &mut upgraded).await.unwrap();

    assert!(h.db.applied_sql().is_empty());
    assert!(h.events.all().is_empty());
    for cs in upgraded.change_sets() {
        assert_eq!(cs.stored_checksum().unwrap().version(), ChecksumVersion::V2);
        assert_eq!(
            h.db.recorded_checksum(cs).unwrap().version(),
            ChecksumVersion::V2
        );
        assert_eq!(h.db.exec_type_of(cs), Some(ExecType::Executed));
    }
    assert_eq!(h.ui.messages().len(), 2);

    // Nothing left to upgrade on the next run.
    h.update(&h.should_run_visitor(), &mut upgraded).await.unwrap();
    assert_eq!(h.db.executed_statements().len(), 2);
}

#[tokio::test]
async fn test_dry_run_records_sql_without_applying() {
    let h = Harness::new();
    let logging = Arc::new(LoggingExecutor::default());
    h.executors.register_primary("app", logging.clone());
    let mut log = changelog(vec![
        changeset("1", "CREATE TABLE users (id INT); CREATE INDEX users_id ON users (id)"),
    ]);

    h.update(&h.should_run_visitor(), &mut log).await.unwrap();

    assert!(h.db.applied_sql().is_empty());
    assert!(h.ui.messages().is_empty());
    let output = logging.output();
    assert_eq!(output.len(), 3);
    assert_eq!(
        output[..2].to_vec(),
        vec![
            "CREATE TABLE users (id INT);",
            "CREATE INDEX users_id ON users (id);",
        ]
    );
    assert!(output[2].starts_with("INSERT INTO DATABASECHANGELOG"));
    assert_eq!(h.db.exec_type_of(&log.change_sets()[0]), None);
    assert_eq!(
        h.db.run_status(&log.change_sets()[0]).await.unwrap(),
        RunStatus::NotRan
    );
    assert!(h.history.ran_change_sets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_real_update_after_dry_run_applies_everything() {
    let h = Harness::new();
    let mut log = changelog(vec![
        changeset("1", "CREATE TABLE users (id INT)"),
        changeset("2", "CREATE TABLE posts (id INT)"),
    ]);

    h.executors
        .register_primary("app", Arc::new(LoggingExecutor::default()));
    h.update(&h.should_run_visitor(), &mut log).await.unwrap();
    assert!(h.db.applied_sql().is_empty());

    h.executors.register_primary("app", h.db.executor());
    h.update(&h.should_run_visitor(), &mut log).await.unwrap();

    assert_eq!(
        h.db.applied_sql(),
        vec!["CREATE TABLE users (id INT)", "CREATE TABLE posts (id INT)"]
    );
    for cs in log.change_sets() {
        assert_eq!(h.db.exec_type_of(cs), Some(ExecType::Executed));
    }
}
