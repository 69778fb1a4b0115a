mod support;

use std::sync::Arc;

use common::testing::{FailingAuditSink, TestConfigBuilder};
use integrity::executor::REPAIR_APPLIED_EVENT;
use integrity::{Confidence, ConfidencePolicy, ExecutionMode, IntegrityError, PlanScope};
use support::{ACTOR, engine_with, live, setup};

#[tokio::test]
async fn test_task_with_project_in_t1_is_repaired_once() {
    let (db, engine, sink) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;

    let preview = engine.plan(&PlanScope::default()).await.unwrap();
    assert_eq!(preview.high_confidence.len(), 1);
    let candidate = &preview.high_confidence[0];
    assert_eq!(candidate.table, "tasks");
    assert_eq!(candidate.row_id, "task-1");
    assert_eq!(candidate.candidate_tenant_id, "T1");
    assert_eq!(candidate.confidence, Confidence::High);

    let first = engine
        .apply(&PlanScope::default(), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();
    assert!(!first.dry_run);
    assert_eq!(first.table("tasks").unwrap().updated, 1);
    assert_eq!(db.tenant_of("tasks", "task-1").await.as_deref(), Some("T1"));

    let second = engine
        .apply(&PlanScope::default(), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();
    assert_eq!(second.total_updated, 0);

    let events = sink.events_of_type(REPAIR_APPLIED_EVENT);
    assert_eq!(events.len(), 1, "one event per table with updates");
    assert_eq!(events[0].actor_id.as_deref(), Some("ops"));
}

#[tokio::test]
async fn test_client_without_parents_is_never_touched() {
    let (db, engine, _) = setup().await;
    db.insert_row("clients", "c-1", None, &[]).await;

    let preview = engine.plan(&PlanScope::default()).await.unwrap();
    assert!(preview.high_confidence.is_empty());
    assert!(preview.low_confidence.is_empty());
    assert_eq!(preview.table("clients").unwrap().unresolved, 1);
    assert_eq!(preview.total_unresolved, 1);

    for policy in [ConfidencePolicy::OnlyHigh, ConfidencePolicy::AllowLowConfidence] {
        let result = engine
            .apply(&PlanScope::default(), policy, live(), ACTOR)
            .await
            .unwrap();
        assert_eq!(result.total_updated, 0);
    }
    assert_eq!(db.tenant_of("clients", "c-1").await, None);
}

#[tokio::test]
async fn test_dry_run_writes_nothing_and_predicts_live_run() {
    let (db, engine, sink) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    db.insert_row("users", "u-2", Some("T2"), &[]).await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;
    db.insert_row("tasks", "task-2", None, &[("created_by", "u-2")])
        .await;
    db.insert_row("project_sections", "s-1", None, &[("project_id", "p-1")])
        .await;

    let dry = engine
        .apply(
            &PlanScope::default(),
            ConfidencePolicy::OnlyHigh,
            ExecutionMode::DryRun,
            ACTOR,
        )
        .await
        .unwrap();
    assert!(dry.dry_run);
    assert_eq!(db.tenant_of("tasks", "task-1").await, None);
    assert_eq!(db.tenant_of("tasks", "task-2").await, None);
    assert_eq!(db.tenant_of("project_sections", "s-1").await, None);
    assert!(sink.events().is_empty());

    let wet = engine
        .apply(&PlanScope::default(), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();
    assert_eq!(dry.total_updated, 3);
    assert_eq!(dry.total_updated, wet.total_updated);
    for outcome in &dry.tables {
        assert_eq!(
            outcome.updated,
            wet.table(&outcome.table).unwrap().updated,
            "{}",
            outcome.table
        );
    }
}

#[tokio::test]
async fn test_low_confidence_candidates_stay_null() {
    let (db, engine, _) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    db.insert_row("users", "u-2", Some("T2"), &[]).await;
    db.insert_row(
        "tasks",
        "task-1",
        None,
        &[("project_id", "p-1"), ("created_by", "u-2")],
    )
    .await;

    let preview = engine.plan(&PlanScope::default()).await.unwrap();
    assert_eq!(preview.low_confidence.len(), 1);
    assert_eq!(preview.low_confidence[0].candidate_tenant_id, "T1");

    for policy in [ConfidencePolicy::OnlyHigh, ConfidencePolicy::AllowLowConfidence] {
        let result = engine
            .apply(&PlanScope::default(), policy, live(), ACTOR)
            .await
            .unwrap();
        let tasks = result.table("tasks").unwrap();
        assert_eq!(tasks.candidates_found, 1);
        assert_eq!(tasks.updated, 0);
        assert_eq!(tasks.skipped, 1);
    }
    assert_eq!(db.tenant_of("tasks", "task-1").await, None);
}

#[tokio::test]
async fn test_quarantined_parent_does_not_resolve() {
    let (db, engine, _) = setup().await;
    db.insert_row("projects", "p-q", Some("Q"), &[]).await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-q")])
        .await;

    let preview = engine.plan(&PlanScope::default()).await.unwrap();
    assert!(preview.high_confidence.is_empty());
    assert_eq!(preview.table("tasks").unwrap().unresolved, 1);
}

#[tokio::test]
async fn test_tenant_scoped_preview_only_returns_that_tenant() {
    let (db, engine, _) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    db.insert_row("projects", "p-2", Some("T2"), &[]).await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;
    db.insert_row("tasks", "task-2", None, &[("project_id", "p-2")])
        .await;
    db.insert_row("clients", "c-1", None, &[]).await;

    let preview = engine.plan(&PlanScope::for_tenant("T2")).await.unwrap();
    assert_eq!(preview.high_confidence.len(), 1);
    assert_eq!(preview.high_confidence[0].row_id, "task-2");
    assert_eq!(preview.total_unresolved, 0);

    engine
        .apply(&PlanScope::for_tenant("T2"), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();
    assert_eq!(db.tenant_of("tasks", "task-1").await, None);
    assert_eq!(db.tenant_of("tasks", "task-2").await.as_deref(), Some("T2"));
}

#[tokio::test]
async fn test_limit_bounds_rows_examined() {
    let (db, engine, _) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    for i in 0..4 {
        db.insert_row("tasks", &format!("task-{i}"), None, &[("project_id", "p-1")])
            .await;
    }

    let scope = PlanScope {
        limit: Some(3),
        tables: Some(vec!["tasks".to_string()]),
        ..PlanScope::default()
    };
    let preview = engine.plan(&scope).await.unwrap();
    let tasks = preview.table("tasks").unwrap();
    assert_eq!(tasks.orphans_examined, 3);
    assert!(tasks.truncated);

    let too_big = PlanScope {
        limit: Some(1001),
        ..PlanScope::default()
    };
    assert!(matches!(
        engine.plan(&too_big).await,
        Err(IntegrityError::Validation(_))
    ));
}

#[tokio::test]
async fn test_failing_table_does_not_undo_other_tables() {
    let (db, engine, _) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;
    db.insert_row("project_sections", "s-1", None, &[("project_id", "p-1")])
        .await;
    db.store
        .execute(
            "CREATE TRIGGER block_task_repair BEFORE UPDATE ON tasks BEGIN SELECT RAISE(ABORT, 'tasks locked'); END",
            &[],
        )
        .await
        .unwrap();

    let result = engine
        .apply(&PlanScope::default(), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();

    assert!(result.table("tasks").unwrap().error.is_some());
    assert_eq!(result.table("project_sections").unwrap().updated, 1);
    assert_eq!(
        db.tenant_of("project_sections", "s-1").await.as_deref(),
        Some("T1")
    );
    assert_eq!(db.tenant_of("tasks", "task-1").await, None);
}

#[tokio::test]
async fn test_repair_succeeds_when_audit_write_fails() {
    let (db, _, _) = setup().await;
    db.insert_row("projects", "p-1", Some("T1"), &[]).await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;
    let engine = engine_with(
        &db,
        &TestConfigBuilder::new().build(),
        Arc::new(FailingAuditSink),
    )
    .await;

    let result = engine
        .apply(&PlanScope::default(), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();
    assert_eq!(result.total_updated, 1);
    assert_eq!(db.tenant_of("tasks", "task-1").await.as_deref(), Some("T1"));
}

#[tokio::test]
async fn test_chained_orphans_are_repaired_in_one_run() {
    let (db, engine, _) = setup().await;
    db.insert_row("clients", "c-1", Some("T1"), &[]).await;
    // The task only resolves once its project has taken the client's tenant
    db.insert_row("projects", "p-1", None, &[("client_id", "c-1")])
        .await;
    db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
        .await;

    let dry = engine
        .apply(
            &PlanScope::default(),
            ConfidencePolicy::OnlyHigh,
            ExecutionMode::DryRun,
            ACTOR,
        )
        .await
        .unwrap();
    assert_eq!(dry.table("projects").unwrap().updated, 1);
    assert_eq!(dry.table("tasks").unwrap().updated, 1);
    assert_eq!(db.tenant_of("projects", "p-1").await, None);

    let first = engine
        .apply(&PlanScope::default(), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();
    assert_eq!(first.total_updated, 2);
    assert_eq!(first.total_updated, dry.total_updated);
    assert_eq!(db.tenant_of("projects", "p-1").await.as_deref(), Some("T1"));
    assert_eq!(db.tenant_of("tasks", "task-1").await.as_deref(), Some("T1"));

    let second = engine
        .apply(&PlanScope::default(), ConfidencePolicy::OnlyHigh, live(), ACTOR)
        .await
        .unwrap();
    assert_eq!(second.total_updated, 0);
}
