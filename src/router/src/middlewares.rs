//! Request gates in front of the two route trees.
//!
//! `/admin` requires a platform admin key; `/api/v1` resolves the caller's
//! tenant from [`TENANT_HEADER`] and applies the configured tenancy mode.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};

use common::auth::AdminAuthenticator;
use common::tenancy::TenantResolution;
use common::{Store, TenancyPolicy};

use crate::api::ApiFailure;

/// Request header naming the tenant (id or slug) of an ordinary request
pub const TENANT_HEADER: &str = "x-tenant-id";
/// Response header set when soft mode served a request unscoped
pub const TENANCY_WARNING_HEADER: &str = "x-tenancy-warning";

/// Authenticate the admin key and attach the [`common::auth::AdminContext`].
pub async fn admin_auth_middleware(
    authenticator: Arc<AdminAuthenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match authenticator.authenticate(authorization) {
        Ok(ctx) => {
            tracing::debug!(actor = %ctx.key_name, path = %request.uri().path(), "Admin request authenticated");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => {
            log::warn!(
                "Admin authentication failed for {}: {}",
                request.uri().path(),
                err.message
            );
            ApiFailure::from(err).into_response()
        }
    }
}

/// Resolve the request tenant and attach the [`TenantResolution`].
pub async fn tenancy_middleware(
    store: Store,
    policy: TenancyPolicy,
    mut request: Request,
    next: Next,
) -> Response {
    let requested = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let resolution = match policy
        .resolve_request_tenant(&store, requested.as_deref())
        .await
    {
        Ok(resolution) => resolution,
        Err(err) => {
            tracing::warn!(mode = %policy.mode, requested = ?requested, error = %err, "Rejected request");
            return ApiFailure::from(err).into_response();
        }
    };

    let warning = match &resolution {
        TenantResolution::Unscoped { warning } => Some(warning.clone()),
        TenantResolution::Scoped { .. } => None,
    };
    request.extensions_mut().insert(resolution);

    let mut response = next.run(request).await;
    if let Some(warning) = warning {
        match HeaderValue::from_str(&warning) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(TENANCY_WARNING_HEADER, value);
            }
            // Requested values with non-visible characters
            Err(_) => {
                response.headers_mut().insert(
                    TENANCY_WARNING_HEADER,
                    HeaderValue::from_static("tenant unresolved; serving unscoped legacy lookup"),
                );
            }
        }
    }
    response
}
