use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Deserialize;

use common::auth::AdminContext;
use common::model::{Tenant, TenantStatus};
use integrity::{PurgeReport, TenantDeletionReport};

use crate::RouterState;
use crate::api::ApiResult;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TenantStatus,
}

#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    /// Must equal the configured purge phrase verbatim
    pub confirmation: String,
}

/// GET /admin/tenants/:tenant_id
pub async fn get_tenant<S: RouterState>(
    state: State<S>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.integrity().get_tenant(&tenant_id).await?))
}

/// PUT /admin/tenants/:tenant_id/status
pub async fn update_status<S: RouterState>(
    state: State<S>,
    Extension(admin): Extension<AdminContext>,
    Path(tenant_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<Tenant>> {
    let tenant = state
        .integrity()
        .set_tenant_status(&tenant_id, request.status, Some(&admin.key_name))
        .await?;
    Ok(Json(tenant))
}

/// DELETE /admin/tenants/:tenant_id
///
/// Removes the tenant and every record it owns. The tenant must be
/// deactivated first.
pub async fn delete_tenant<S: RouterState>(
    state: State<S>,
    Extension(admin): Extension<AdminContext>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<TenantDeletionReport>> {
    tracing::warn!(actor = %admin.key_name, %tenant_id, "Tenant deletion requested");
    let report = state
        .integrity()
        .delete_tenant(&tenant_id, Some(&admin.key_name))
        .await?;
    Ok(Json(report))
}

/// POST /admin/purge
pub async fn purge<S: RouterState>(
    state: State<S>,
    Extension(admin): Extension<AdminContext>,
    Json(request): Json<PurgeRequest>,
) -> ApiResult<Json<PurgeReport>> {
    tracing::warn!(actor = %admin.key_name, "Data purge requested");
    let report = state
        .integrity()
        .purge(&request.confirmation, Some(&admin.key_name))
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::body::Body;
    use common::config::PURGE_CONFIRMATION_PHRASE;
    use common::testing::TestConfigBuilder;
    use integrity::cascade::TENANT_DELETED_EVENT;
    use serde_json::json;

    fn set_status(tenant: &str, status: &str) -> axum::http::Request<Body> {
        admin("PUT", &format!("/admin/tenants/{tenant}/status"))
            .header("content-type", "application/json")
            .body(json_body(json!({ "status": status })))
            .unwrap()
    }

    fn delete(tenant: &str) -> axum::http::Request<Body> {
        admin("DELETE", &format!("/admin/tenants/{tenant}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_tenant_and_not_found() {
        let h = harness(TestConfigBuilder::new()).await;

        let request = admin("GET", "/admin/tenants/T1").body(Body::empty()).unwrap();
        let (response, body) = send(&h.router, request).await;
        assert_eq!(response.status(), 200);
        assert_eq!(body["slug"], "acme");
        assert_eq!(body["status"], "active");

        let request = admin("GET", "/admin/tenants/nobody").body(Body::empty()).unwrap();
        let (response, body) = send(&h.router, request).await;
        assert_eq!(response.status(), 404);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_active_tenant_cannot_be_deleted() {
        let h = harness(TestConfigBuilder::new()).await;
        let (response, body) = send(&h.router, delete("T1")).await;
        assert_eq!(response.status(), 409);
        assert_eq!(body["error"], "precondition_failed");
        assert!(h.db.row_exists("tenants", "T1").await);
    }

    #[tokio::test]
    async fn test_deactivate_then_delete_removes_owned_rows() {
        let h = harness(TestConfigBuilder::new()).await;
        h.db.insert_row("projects", "p-1", Some("T1"), &[]).await;
        h.db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
            .await;
        h.db.insert_row("projects", "p-2", Some("T2"), &[]).await;

        let (response, body) = send(&h.router, set_status("T1", "inactive")).await;
        assert_eq!(response.status(), 200);
        assert_eq!(body["status"], "inactive");

        let (response, body) = send(&h.router, delete("T1")).await;
        assert_eq!(response.status(), 200);
        assert_eq!(body["deleted"]["projects"], 1);
        assert_eq!(body["deleted"]["tasks"], 1);

        assert!(!h.db.row_exists("tenants", "T1").await);
        assert!(!h.db.row_exists("tasks", "task-1").await);
        assert!(h.db.row_exists("projects", "p-2").await);

        let events = h.sink.events_of_type(TENANT_DELETED_EVENT);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tenant_id, None);
        assert_eq!(events[0].actor_id.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn test_quarantine_tenant_is_protected() {
        let h = harness(TestConfigBuilder::new()).await;
        let (response, _) = send(&h.router, set_status("Q", "inactive")).await;
        assert_eq!(response.status(), 409);
        let (response, _) = send(&h.router, delete("Q")).await;
        assert_eq!(response.status(), 409);
    }

    #[tokio::test]
    async fn test_purge_requires_permission_and_phrase() {
        let h = harness(TestConfigBuilder::new()).await;
        let request = admin("POST", "/admin/purge")
            .header("content-type", "application/json")
            .body(json_body(json!({ "confirmation": PURGE_CONFIRMATION_PHRASE })))
            .unwrap();
        let (response, _) = send(&h.router, request).await;
        assert_eq!(response.status(), 409);
        assert!(h.db.row_exists("tenants", "T1").await);

        let h = harness(TestConfigBuilder::new().with_purge(true, false, "development")).await;
        let wrong = admin("POST", "/admin/purge")
            .header("content-type", "application/json")
            .body(json_body(json!({ "confirmation": "yes" })))
            .unwrap();
        let (response, _) = send(&h.router, wrong).await;
        assert_eq!(response.status(), 409);

        let right = admin("POST", "/admin/purge")
            .header("content-type", "application/json")
            .body(json_body(json!({ "confirmation": PURGE_CONFIRMATION_PHRASE })))
            .unwrap();
        let (response, body) = send(&h.router, right).await;
        assert_eq!(response.status(), 200);
        assert_eq!(body["failed_tables"], 0);
        assert_eq!(h.db.count_rows("tenants").await, 1);
        assert!(h.db.row_exists("tenants", "Q").await);
    }
}
