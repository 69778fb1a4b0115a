//! Multi-tenant data-integrity and repair engine.
//!
//! Scans for rows that lost their tenant, plans and applies repairs through
//! the declared ownership graph, and removes tenants with their whole record
//! graph in one transaction. [`Integrity`] bundles the store, configuration,
//! quarantine identity and audit trail that every component borrows.

pub mod backfill;
pub mod cascade;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod planner;
pub mod purge;
pub mod quarantine;
pub mod scanner;
pub mod scope;

use common::config::{Configuration, IntegrityConfig, PurgeConfig};
use common::model::{AuditPage, Tenant, TenantStatus};
use common::{AuditTrail, QuarantineTenant, Store};

pub use backfill::{Backfill, BackfillReport, BackfillTable};
pub use cascade::{TenantDeletionCascade, TenantDeletionReport};
pub use error::{IntegrityError, PreconditionFailure};
pub use executor::{
    ConfidencePolicy, ExecutionMode, LiveConfirmation, RepairExecutor, RepairResult,
    TableRepairOutcome,
};
pub use lifecycle::TenantLifecycle;
pub use planner::{Confidence, RepairCandidate, RepairPlanner, RepairPreview, TablePlanSummary};
pub use purge::{DataPurge, PurgeReport, PurgeTableStatus};
pub use quarantine::{Quarantine, QuarantineResult};
pub use scanner::{HealthSummary, IntegrityScanner, TableHealth};
pub use scope::{PlanScope, ScanScope};

use error::Result;

#[derive(Debug, Clone)]
pub struct Integrity {
    store: Store,
    config: IntegrityConfig,
    purge: PurgeConfig,
    production: bool,
    quarantine: Option<QuarantineTenant>,
    audit: AuditTrail,
}

impl Integrity {
    pub fn new(
        store: Store,
        configuration: &Configuration,
        quarantine: Option<QuarantineTenant>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            store,
            config: configuration.integrity.clone(),
            purge: configuration.purge.clone(),
            production: configuration.is_production(),
            quarantine,
            audit,
        }
    }

    /// Resolve the quarantine tenant once and audit into the store itself.
    pub async fn from_store(store: Store, configuration: &Configuration) -> Result<Self> {
        let quarantine =
            QuarantineTenant::resolve(&store, &configuration.tenancy.quarantine_slug).await?;
        let audit = AuditTrail::from_store(store.clone());
        Ok(Self::new(store, configuration, quarantine, audit))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn quarantine(&self) -> Option<&QuarantineTenant> {
        self.quarantine.as_ref()
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    pub fn scanner(&self) -> IntegrityScanner<'_> {
        IntegrityScanner::new(
            &self.store,
            self.quarantine.as_ref(),
            self.config.scan_row_limit,
        )
    }

    pub fn planner(&self) -> RepairPlanner<'_> {
        RepairPlanner::new(&self.store, self.quarantine.as_ref(), &self.config)
    }

    pub fn executor(&self) -> RepairExecutor<'_> {
        RepairExecutor::new(
            &self.store,
            self.quarantine.as_ref(),
            &self.config,
            &self.audit,
        )
    }

    pub async fn scan(&self, scope: &ScanScope) -> Result<HealthSummary> {
        self.scanner().scan(scope).await
    }

    pub async fn plan(&self, scope: &PlanScope) -> Result<RepairPreview> {
        self.planner().plan(scope).await
    }

    pub async fn apply(
        &self,
        scope: &PlanScope,
        policy: ConfidencePolicy,
        mode: ExecutionMode,
        actor: Option<&str>,
    ) -> Result<RepairResult> {
        self.executor().apply(scope, policy, mode, actor).await
    }

    pub async fn backfill(&self, mode: ExecutionMode, actor: Option<&str>) -> Result<BackfillReport> {
        Backfill::new(
            &self.store,
            self.quarantine.as_ref(),
            &self.config,
            &self.audit,
        )
        .run(mode, actor)
        .await
    }

    pub async fn delete_tenant(
        &self,
        tenant_id: &str,
        actor: Option<&str>,
    ) -> Result<TenantDeletionReport> {
        TenantDeletionCascade::new(&self.store, self.quarantine.as_ref(), &self.audit)
            .delete_tenant(tenant_id, actor)
            .await
    }

    pub async fn purge(&self, phrase: &str, actor: Option<&str>) -> Result<PurgeReport> {
        DataPurge::new(
            &self.store,
            self.quarantine.as_ref(),
            &self.purge,
            self.production,
            &self.audit,
        )
        .purge(phrase, actor)
        .await
    }

    pub async fn quarantine_rows(
        &self,
        table: &str,
        row_ids: &[String],
        actor: Option<&str>,
    ) -> Result<QuarantineResult> {
        Quarantine::new(
            &self.store,
            self.quarantine.as_ref(),
            &self.audit,
            self.config.max_limit,
        )
        .quarantine_rows(table, row_ids, actor)
        .await
    }

    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.lifecycle().get_tenant(tenant_id).await
    }

    pub async fn set_tenant_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
        actor: Option<&str>,
    ) -> Result<Tenant> {
        self.lifecycle().set_status(tenant_id, status, actor).await
    }

    pub async fn audit_events(
        &self,
        tenant_id: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<AuditPage> {
        Ok(common::audit::list_events(&self.store, tenant_id, page, per_page).await?)
    }

    fn lifecycle(&self) -> TenantLifecycle<'_> {
        TenantLifecycle::new(&self.store, self.quarantine.as_ref(), &self.audit)
    }
}
