use axum::{
    Extension, Json,
    extract::{Query, State},
    http::HeaderMap,
};
use serde::Deserialize;

use common::auth::AdminContext;
use integrity::{
    BackfillReport, ConfidencePolicy, ExecutionMode, HealthSummary, LiveConfirmation, PlanScope,
    QuarantineResult, RepairPreview, RepairResult, ScanScope,
};

use crate::RouterState;
use crate::api::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct HealthSummaryQuery {
    pub tenant_id: Option<String>,
    /// Comma-separated table names
    pub tables: Option<String>,
    pub row_limit: Option<u64>,
}

impl HealthSummaryQuery {
    fn scope(self) -> ScanScope {
        ScanScope {
            tenant_id: self.tenant_id,
            tables: self.tables.map(|tables| {
                tables
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            row_limit: self.row_limit,
        }
    }
}

/// Body of repair preview and repair apply
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RepairRequest {
    pub tenant_id: Option<String>,
    pub tables: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub apply_only_high_confidence: bool,
    pub dry_run: bool,
}

impl Default for RepairRequest {
    fn default() -> Self {
        Self {
            tenant_id: None,
            tables: None,
            limit: None,
            apply_only_high_confidence: true,
            dry_run: false,
        }
    }
}

impl RepairRequest {
    fn scope(&self) -> PlanScope {
        PlanScope {
            tenant_id: self.tenant_id.clone(),
            tables: self.tables.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BackfillRequest {
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct QuarantineRequest {
    pub table: String,
    pub row_ids: Vec<String>,
}

/// A live run needs `x-confirm-repair: apply`; dry runs need nothing.
fn execution_mode(dry_run: bool, headers: &HeaderMap) -> ApiResult<ExecutionMode> {
    if dry_run {
        return Ok(ExecutionMode::DryRun);
    }
    let header = headers
        .get(LiveConfirmation::HEADER)
        .and_then(|value| value.to_str().ok());
    Ok(ExecutionMode::Live(LiveConfirmation::from_header(header)?))
}

/// GET /admin/integrity/health-summary
pub async fn health_summary<S: RouterState>(
    state: State<S>,
    Query(query): Query<HealthSummaryQuery>,
) -> ApiResult<Json<HealthSummary>> {
    let summary = state.integrity().scan(&query.scope()).await?;
    Ok(Json(summary))
}

/// POST /admin/integrity/repair-preview
pub async fn repair_preview<S: RouterState>(
    state: State<S>,
    Json(request): Json<RepairRequest>,
) -> ApiResult<Json<RepairPreview>> {
    let preview = state.integrity().plan(&request.scope()).await?;
    Ok(Json(preview))
}

/// POST /admin/integrity/repair-apply
pub async fn repair_apply<S: RouterState>(
    state: State<S>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Json(request): Json<RepairRequest>,
) -> ApiResult<Json<RepairResult>> {
    let mode = execution_mode(request.dry_run, &headers)?;
    tracing::info!(
        actor = %admin.key_name,
        dry_run = mode.is_dry_run(),
        tenant_id = ?request.tenant_id,
        "Repair apply requested"
    );

    let result = state
        .integrity()
        .apply(
            &request.scope(),
            ConfidencePolicy::from_flag(request.apply_only_high_confidence),
            mode,
            Some(&admin.key_name),
        )
        .await?;
    Ok(Json(result))
}

/// POST /admin/integrity/backfill
pub async fn backfill<S: RouterState>(
    state: State<S>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Json(request): Json<BackfillRequest>,
) -> ApiResult<Json<BackfillReport>> {
    let mode = execution_mode(request.dry_run, &headers)?;
    let report = state
        .integrity()
        .backfill(mode, Some(&admin.key_name))
        .await?;
    Ok(Json(report))
}

/// POST /admin/integrity/quarantine
pub async fn quarantine<S: RouterState>(
    state: State<S>,
    Extension(admin): Extension<AdminContext>,
    Json(request): Json<QuarantineRequest>,
) -> ApiResult<Json<QuarantineResult>> {
    let result = state
        .integrity()
        .quarantine_rows(&request.table, &request.row_ids, Some(&admin.key_name))
        .await?;
    Ok(Json(result))
}
