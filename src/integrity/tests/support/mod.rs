#![allow(dead_code)]

use std::sync::Arc;

use common::config::Configuration;
use common::model::TenantStatus;
use common::testing::{RecordingAuditSink, TestConfigBuilder, TestDb};
use common::{AuditSink, AuditTrail, QuarantineTenant};
use integrity::{ExecutionMode, Integrity, LiveConfirmation};

pub const ACTOR: Option<&str> = Some("ops");

pub fn live() -> ExecutionMode {
    ExecutionMode::Live(LiveConfirmation::from_header(Some("apply")).expect("confirmation"))
}

/// Engine over `db` auditing into `sink`, quarantine resolved from the store.
pub async fn engine_with(
    db: &TestDb,
    config: &Configuration,
    sink: Arc<dyn AuditSink>,
) -> Integrity {
    let quarantine = QuarantineTenant::resolve(&db.store, &config.tenancy.quarantine_slug)
        .await
        .expect("quarantine lookup");
    Integrity::new(db.store.clone(), config, quarantine, AuditTrail::new(sink))
}

/// Seeded database with tenants T1, T2 (active) and the quarantine tenant,
/// plus an engine recording its audit events.
pub async fn setup() -> (TestDb, Integrity, Arc<RecordingAuditSink>) {
    let db = TestDb::new().await;
    db.seed_tenant("T1", "acme", TenantStatus::Active).await;
    db.seed_tenant("T2", "globex", TenantStatus::Active).await;
    db.seed_tenant("Q", "quarantine", TenantStatus::Active).await;

    let sink = Arc::new(RecordingAuditSink::default());
    let engine = engine_with(&db, &TestConfigBuilder::new().build(), sink.clone()).await;
    (db, engine, sink)
}
