use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use common::model::AuditPage;
use common::tenancy::TenantResolution;

use crate::RouterState;
use crate::api::{ApiFailure, ApiResult};

const MAX_PER_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub tenant_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

impl AuditQuery {
    fn check(&self) -> ApiResult<()> {
        if self.page == 0 {
            return Err(ApiFailure::validation("page starts at 1"));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(ApiFailure::validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        Ok(())
    }
}

/// GET /admin/audit
///
/// Without `tenant_id` every event is listed, platform-level ones included.
pub async fn admin_audit<S: RouterState>(
    state: State<S>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<AuditPage>> {
    query.check()?;
    let page = state
        .integrity()
        .audit_events(query.tenant_id.as_deref(), query.page, query.per_page)
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/audit
///
/// The caller's own audit log. `tenant_id` in the query is ignored; the
/// tenant comes from the tenancy gate.
pub async fn tenant_audit<S: RouterState>(
    state: State<S>,
    Extension(resolution): Extension<TenantResolution>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<AuditPage>> {
    query.check()?;
    let tenant_id = match &resolution {
        TenantResolution::Scoped { tenant_id } => Some(tenant_id.as_str()),
        TenantResolution::Unscoped { .. } => None,
    };
    let page = state
        .integrity()
        .audit_events(tenant_id, query.page, query.per_page)
        .await?;
    Ok(Json(page))
}
