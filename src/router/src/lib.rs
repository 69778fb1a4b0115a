use std::sync::Arc;

use axum::{Router, http::StatusCode, middleware, response::IntoResponse, routing::get};
use tower_http::trace::TraceLayer;

use common::auth::AdminAuthenticator;
use common::config::Configuration;
use common::{Store, TenancyPolicy};
use integrity::Integrity;

pub mod api;
pub mod endpoints;
pub mod middlewares;

pub use middlewares::{TENANCY_WARNING_HEADER, TENANT_HEADER};

pub trait RouterState: std::fmt::Debug + Clone + Send + Sync + 'static {
    fn integrity(&self) -> &Integrity;
    fn config(&self) -> &Configuration;
    fn authenticator(&self) -> &Arc<AdminAuthenticator>;
    fn tenancy(&self) -> TenancyPolicy;

    fn store(&self) -> &Store {
        self.integrity().store()
    }
}

/// Shared state handed to every route handler
#[derive(Clone)]
pub struct AppState {
    integrity: Arc<Integrity>,
    config: Arc<Configuration>,
    authenticator: Arc<AdminAuthenticator>,
    tenancy: TenancyPolicy,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("integrity", &"Integrity")
            .field("admin_keys", &self.authenticator.key_count())
            .field("tenancy", &self.tenancy.mode)
            .finish()
    }
}

impl AppState {
    pub fn new(integrity: Integrity, config: Configuration) -> Self {
        let authenticator = Arc::new(AdminAuthenticator::new(&config.admin));
        let tenancy = TenancyPolicy::new(config.tenancy.mode);

        Self {
            integrity: Arc::new(integrity),
            config: Arc::new(config),
            authenticator,
            tenancy,
        }
    }
}

impl RouterState for AppState {
    fn integrity(&self) -> &Integrity {
        &self.integrity
    }

    fn config(&self) -> &Configuration {
        &self.config
    }

    fn authenticator(&self) -> &Arc<AdminAuthenticator> {
        &self.authenticator
    }

    fn tenancy(&self) -> TenancyPolicy {
        self.tenancy
    }
}

/// Create a new router instance with all routes configured
pub fn create_router<S: RouterState>(state: S) -> Router {
    let authenticator = state.authenticator().clone();
    let admin_layer = middleware::from_fn(move |req, next| {
        middlewares::admin_auth_middleware(authenticator.clone(), req, next)
    });

    let store = state.store().clone();
    let policy = state.tenancy();
    let tenancy_layer = middleware::from_fn(move |req, next| {
        middlewares::tenancy_middleware(store.clone(), policy, req, next)
    });

    Router::new()
        // Public health check endpoint (no authentication)
        .route("/health", get(health_check))
        .nest("/admin", endpoints::admin_router().layer(admin_layer))
        .nest("/api/v1", endpoints::tenant_router().layer(tenancy_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, Response};
    use common::testing::{RecordingAuditSink, TestConfigBuilder, TestDb};
    use common::AuditTrail;
    use common::model::TenantStatus;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    pub const ADMIN_KEY: &str = "admin-secret";

    pub struct Harness {
        pub db: TestDb,
        pub sink: Arc<RecordingAuditSink>,
        pub router: Router,
    }

    pub async fn harness(builder: TestConfigBuilder) -> Harness {
        let config = builder.with_admin_key(ADMIN_KEY, "ops").build();
        let db = TestDb::new().await;
        db.seed_tenant("T1", "acme", TenantStatus::Active).await;
        db.seed_tenant("T2", "globex", TenantStatus::Active).await;
        db.seed_tenant("Q", "quarantine", TenantStatus::Active).await;

        let quarantine = common::QuarantineTenant::resolve(&db.store, "quarantine")
            .await
            .unwrap();
        let sink = Arc::new(RecordingAuditSink::default());
        let integrity = Integrity::new(
            db.store.clone(),
            &config,
            quarantine,
            AuditTrail::new(sink.clone()),
        );
        let router = create_router(AppState::new(integrity, config));
        Harness { db, sink, router }
    }

    pub async fn send(router: &Router, request: Request<Body>) -> (Response<()>, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (Response::from_parts(parts, ()), json)
    }

    pub fn admin(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {ADMIN_KEY}"))
    }

    pub fn json_body(value: serde_json::Value) -> Body {
        Body::from(value.to_string())
    }
}
