//! Integration tests for update configuration.
//!
//! These tests verify that configuration files drive visitor construction.

use std::sync::Arc;

use shiftlog::migrate::InMemoryDatabase;
use shiftlog::prelude::*;

/// Test minimal configuration
#[test]
fn test_config_minimal() {
    let config = UpdateConfig::from_toml("").expect("Failed to parse config");
    assert_eq!(config, UpdateConfig::default());
}

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let config_str = r#"
        primary_executor = "jdbc"
        checksum_version = 1
        show_progress = false
        restore_quoting_on_failure = false
        history_table = "SCHEMA_HISTORY"
    "#;

    let config = UpdateConfig::from_toml(config_str).expect("Failed to parse config");

    assert_eq!(config.primary_executor, "jdbc");
    assert_eq!(
        config.checksum_versions().unwrap().latest(),
        ChecksumVersion::V1
    );
    assert!(!config.show_progress);
    assert!(!config.restore_quoting_on_failure);
    assert!(
        config
            .logging_executor()
            .script()
            .is_empty()
    );
}

/// Test invalid TOML is reported as a configuration error
#[test]
fn test_config_invalid_toml() {
    let err = UpdateConfig::from_toml("show_progress = ").unwrap_err();
    assert!(matches!(err, MigrationError::Config(_)));
}

/// Test a configured visitor runs through the configured executor name
#[tokio::test]
async fn test_configured_visitor_uses_named_executor() {
    let config = UpdateConfig::from_toml(
        r#"
        primary_executor = "jdbc"
        show_progress = false
        history_table = "SCHEMA_HISTORY"
    "#,
    )
    .unwrap();

    let executors = Arc::new(config.executor_service());
    let logging = Arc::new(config.logging_executor());
    executors.register_primary("app", logging.clone());
    let db = InMemoryDatabase::new("app").with_executor_service(executors.clone());

    let histories = Arc::new(HistoryServiceFactory::new());
    histories.register("app", db.history_service());

    let visitor = UpdateVisitor::from_config(&config, executors, histories).unwrap();
    let mut changeset = ChangeSet::new("1", "alice", "db/changelog.sql")
        .with_change(Change::sql("CREATE TABLE users (id INT)"));
    let reject: Arc<dyn ChangeSetFilter> =
        Arc::new(|_: &ChangeSet| ChangeSetFilterResult::reject("already ran"));
    let visitor = visitor.with_should_run_filter(reject);

    let changelog = DatabaseChangeLog::new("db/changelog.sql");
    visitor
        .visit(&mut changeset, &changelog, &db, &[])
        .await
        .unwrap();

    let output = logging.output();
    assert_eq!(output.len(), 1);
    assert!(output[0].starts_with("UPDATE SCHEMA_HISTORY SET MD5SUM = '2:"));
}

/// Test a configured dry run renders history writes against the configured table
#[tokio::test]
async fn test_configured_dry_run_renders_history_writes() {
    let config = UpdateConfig::new()
        .show_progress(false)
        .history_table("SCHEMA_HISTORY");

    let executors = Arc::new(config.executor_service());
    let logging = Arc::new(config.logging_executor());
    executors.register_primary("app", logging.clone());
    let db = InMemoryDatabase::new("app").with_executor_service(executors.clone());

    let histories = Arc::new(HistoryServiceFactory::new());
    histories.register("app", db.history_service());

    let visitor = UpdateVisitor::from_config(&config, executors, histories).unwrap();
    let mut changelog = DatabaseChangeLog::new("db/changelog.sql").with_change_set(
        ChangeSet::new("1", "alice", "db/changelog.sql")
            .with_change(Change::sql("CREATE TABLE users (id INT)")),
    );

    ChangeLogIterator::new()
        .run(&mut changelog, &visitor, &db)
        .await
        .unwrap();

    let output = logging.output();
    assert_eq!(output.len(), 2);
    assert_eq!(output[0], "CREATE TABLE users (id INT);");
    assert!(output[1].starts_with("INSERT INTO SCHEMA_HISTORY"));
    assert!(output[1].contains("'EXECUTED'"));
    assert!(db.applied_sql().is_empty());
    assert_eq!(db.exec_type_of(&changelog.change_sets()[0]), None);
}
