mod support;

use std::sync::Arc;

use common::config::PURGE_CONFIRMATION_PHRASE;
use common::model::TenantStatus;
use common::testing::{FailingAuditSink, RecordingAuditSink, TestConfigBuilder, TestDb};
use integrity::lifecycle::TENANT_STATUS_CHANGED_EVENT;
use integrity::quarantine::ROWS_QUARANTINED_EVENT;
use integrity::{ExecutionMode, IntegrityError, PreconditionFailure, PurgeTableStatus};
use support::{ACTOR, engine_with, live, setup};

#[tokio::test]
async fn test_backfill_walks_parents_first() {
    let (db, engine, _) = setup().await;
    db.insert_row("clients", "c-1", Some("T1"), &[]).await;
    // Project is orphaned but resolves through its client; its task only
    // resolves once the project has been repaired.
    db.insert_row("projects", "p-1", None, &[("client_id", "c-1")])
        .await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;
    db.insert_row("tags", "tag-1", None, &[]).await;

    let dry = engine.backfill(ExecutionMode::DryRun, ACTOR).await.unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.table("projects").unwrap().before, 1);
    assert_eq!(dry.table("projects").unwrap().after, 0);
    assert_eq!(dry.table("tasks").unwrap().updated, 1);
    assert_eq!(db.tenant_of("projects", "p-1").await, None);

    let report = engine.backfill(live(), ACTOR).await.unwrap();
    assert_eq!(report.table("projects").unwrap().updated, 1);
    assert_eq!(report.table("tasks").unwrap().updated, 1);
    assert_eq!(report.table("tasks").unwrap().after, 0);
    let tags = report.table("tags").unwrap();
    assert_eq!((tags.before, tags.after, tags.unresolved), (1, 1, 1));
    assert_eq!(db.tenant_of("tasks", "task-1").await.as_deref(), Some("T1"));
    assert_eq!(report.total_before, 3);
    assert_eq!(report.total_after, 1);

    // The dry run predicted the live run table by table
    assert_eq!(dry.total_updated, report.total_updated);
    assert_eq!(dry.total_after, report.total_after);
    for entry in &dry.tables {
        let live_entry = report.table(&entry.table).unwrap();
        assert_eq!(entry.updated, live_entry.updated, "{}", entry.table);
        assert_eq!(entry.after, live_entry.after, "{}", entry.table);
    }

    let again = engine.backfill(live(), ACTOR).await.unwrap();
    assert_eq!(again.total_updated, 0);
}

#[tokio::test]
async fn test_backfill_pages_through_large_tables() {
    let db = TestDb::new().await;
    db.seed_tenant("T1", "acme", TenantStatus::Active).await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    for i in 0..7 {
        db.insert_row("tasks", &format!("task-{i}"), None, &[("project_id", "p-1")])
            .await;
    }
    let config = TestConfigBuilder::new().with_backfill_batch_size(3).build();
    let engine = engine_with(&db, &config, Arc::new(RecordingAuditSink::default())).await;

    let report = engine.backfill(live(), ACTOR).await.unwrap();
    let tasks = report.table("tasks").unwrap();
    assert_eq!(tasks.before, 7);
    assert_eq!(tasks.updated, 7);
    assert_eq!(tasks.after, 0);
}

#[tokio::test]
async fn test_backfill_reports_failing_table_and_continues() {
    let (db, engine, _) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;
    db.store.execute("DROP TABLE subtasks", &[]).await.unwrap();

    let report = engine.backfill(live(), ACTOR).await.unwrap();

    let subtasks = report.table("subtasks").unwrap();
    assert!(subtasks.error.as_deref().unwrap().starts_with("Store error"));
    assert_eq!(report.table("tasks").unwrap().updated, 1);
}

#[tokio::test]
async fn test_purge_requires_all_confirmations() {
    let (db, _, _) = setup().await;
    db.insert_row("tasks", "task-1", Some("T1"), &[]).await;

    let disabled = engine_with(
        &db,
        &TestConfigBuilder::new().build(),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;
    assert!(matches!(
        disabled.purge(PURGE_CONFIRMATION_PHRASE, ACTOR).await,
        Err(IntegrityError::Precondition(PreconditionFailure::PurgeNotAllowed))
    ));

    let production = engine_with(
        &db,
        &TestConfigBuilder::new().with_purge(true, false, "production").build(),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;
    assert!(matches!(
        production.purge(PURGE_CONFIRMATION_PHRASE, ACTOR).await,
        Err(IntegrityError::Precondition(
            PreconditionFailure::PurgeNotAllowedInProduction
        ))
    ));

    let staging = engine_with(
        &db,
        &TestConfigBuilder::new().with_purge(true, false, "staging").build(),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;
    assert!(matches!(
        staging.purge("purge all application data", ACTOR).await,
        Err(IntegrityError::Precondition(
            PreconditionFailure::ConfirmationPhraseMismatch
        ))
    ));

    assert!(db.row_exists("tasks", "task-1").await);
}

#[tokio::test]
async fn test_purge_continues_past_failing_tables() {
    let (db, _, _) = setup().await;
    db.insert_row("tasks", "task-1", Some("T1"), &[]).await;
    db.insert_row("users", "u-1", Some("T1"), &[]).await;
    db.store.execute("DROP TABLE tags", &[]).await.unwrap();
    let engine = engine_with(
        &db,
        &TestConfigBuilder::new().with_purge(true, false, "test").build(),
        Arc::new(FailingAuditSink),
    )
    .await;

    let report = engine.purge(PURGE_CONFIRMATION_PHRASE, ACTOR).await.unwrap();

    assert!(matches!(
        report.status("tags"),
        Some(PurgeTableStatus::Failed { .. })
    ));
    assert_eq!(
        report.status("tasks"),
        Some(&PurgeTableStatus::Purged { rows: 1 })
    );
    assert_eq!(
        report.status("tenants"),
        Some(&PurgeTableStatus::Purged { rows: 2 })
    );
    assert_eq!(report.failed_tables, 1);
    assert_eq!(db.count_rows("users").await, 0);
    // Only the quarantine tenant survives
    assert_eq!(db.count_rows("tenants").await, 1);
}

#[tokio::test]
async fn test_quarantine_tenant_survives_purge() {
    let (db, _, _) = setup().await;
    db.insert_row("clients", "c-1", Some("Q"), &[]).await;
    let engine = engine_with(
        &db,
        &TestConfigBuilder::new().with_purge(true, false, "test").build(),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;

    engine.purge(PURGE_CONFIRMATION_PHRASE, ACTOR).await.unwrap();
    assert!(db.row_exists("tenants", "Q").await);
    assert!(!db.row_exists("tenants", "T1").await);
    assert!(!db.row_exists("clients", "c-1").await);

    db.insert_row("clients", "c-2", None, &[]).await;
    let summary = engine
        .scan(&integrity::ScanScope::default())
        .await
        .unwrap();
    assert!(summary.quarantine_tenant_present);
    assert_eq!(summary.active_tenants, Some(0));

    engine
        .quarantine_rows("clients", &["c-2".to_string()], ACTOR)
        .await
        .unwrap();
    assert_eq!(db.tenant_of("clients", "c-2").await.as_deref(), Some("Q"));
    assert!(db.row_exists("tenants", "Q").await);
}

#[tokio::test]
async fn test_quarantine_rows_moves_only_orphans() {
    let (db, engine, sink) = setup().await;
    db.insert_row("clients", "c-1", None, &[]).await;
    db.insert_row("clients", "c-2", Some("T1"), &[]).await;

    let result = engine
        .quarantine_rows(
            "clients",
            &["c-1".to_string(), "c-2".to_string()],
            ACTOR,
        )
        .await
        .unwrap();

    assert_eq!(result.requested, 2);
    assert_eq!(result.updated, 1);
    assert_eq!(result.quarantine_tenant_id, "Q");
    assert_eq!(db.tenant_of("clients", "c-1").await.as_deref(), Some("Q"));
    assert_eq!(db.tenant_of("clients", "c-2").await.as_deref(), Some("T1"));
    assert_eq!(sink.events_of_type(ROWS_QUARANTINED_EVENT).len(), 1);

    let summary = engine
        .scan(&integrity::ScanScope::default())
        .await
        .unwrap();
    assert_eq!(summary.table("clients").unwrap().quarantined, 1);
}

#[tokio::test]
async fn test_quarantine_rows_preconditions() {
    let db = TestDb::new().await;
    db.insert_row("clients", "c-1", None, &[]).await;
    let engine = engine_with(
        &db,
        &TestConfigBuilder::new().build(),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;

    assert!(matches!(
        engine.quarantine_rows("clients", &["c-1".to_string()], ACTOR).await,
        Err(IntegrityError::Precondition(
            PreconditionFailure::QuarantineTenantMissing
        ))
    ));
    assert!(matches!(
        engine.quarantine_rows("task_tags", &["x".to_string()], ACTOR).await,
        Err(IntegrityError::Validation(_))
    ));
    assert!(matches!(
        engine.quarantine_rows("clients", &[], ACTOR).await,
        Err(IntegrityError::Validation(_))
    ));
}

#[tokio::test]
async fn test_status_change_is_audited() {
    let (_, engine, sink) = setup().await;

    let tenant = engine
        .set_tenant_status("T1", TenantStatus::Suspended, ACTOR)
        .await
        .unwrap();
    assert_eq!(tenant.status, TenantStatus::Suspended);

    let events = sink.events_of_type(TENANT_STATUS_CHANGED_EVENT);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tenant_id.as_deref(), Some("T1"));
    let metadata = events[0].metadata.as_ref().unwrap();
    assert_eq!(metadata["from"], "active");
    assert_eq!(metadata["to"], "suspended");

    // Same status again is a no-op
    engine
        .set_tenant_status("T1", TenantStatus::Suspended, ACTOR)
        .await
        .unwrap();
    assert_eq!(sink.events_of_type(TENANT_STATUS_CHANGED_EVENT).len(), 1);
}
