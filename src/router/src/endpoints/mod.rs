use axum::{
    Router,
    routing::{get, post, put},
};

use crate::RouterState;

pub mod audit;
pub mod integrity;
pub mod records;
pub mod tenants;

/// Platform administrator routes, mounted under `/admin`
pub fn admin_router<S: RouterState>() -> Router<S> {
    Router::new()
        .route(
            "/integrity/health-summary",
            get(integrity::health_summary::<S>),
        )
        .route(
            "/integrity/repair-preview",
            post(integrity::repair_preview::<S>),
        )
        .route("/integrity/repair-apply", post(integrity::repair_apply::<S>))
        .route("/integrity/backfill", post(integrity::backfill::<S>))
        .route("/integrity/quarantine", post(integrity::quarantine::<S>))
        .route(
            "/tenants/:tenant_id",
            get(tenants::get_tenant::<S>).delete(tenants::delete_tenant::<S>),
        )
        .route(
            "/tenants/:tenant_id/status",
            put(tenants::update_status::<S>),
        )
        .route("/purge", post(tenants::purge::<S>))
        .route("/audit", get(audit::admin_audit::<S>))
}

/// Tenant-scoped routes, mounted under `/api/v1` behind the tenancy gate
pub fn tenant_router<S: RouterState>() -> Router<S> {
    Router::new()
        .route("/audit", get(audit::tenant_audit::<S>))
        .route("/records/:table", get(records::list_records::<S>))
}
