use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use common::schema::{self, AUDIT_TABLE, TENANT_COLUMN};
use common::tenancy::TenantResolution;

use crate::RouterState;
use crate::api::{ApiFailure, ApiResult};

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecordRow {
    pub id: String,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub table: String,
    /// Tenant the read was scoped to, absent for a soft-mode legacy lookup
    pub tenant_id: Option<String>,
    pub scoped: bool,
    pub rows: Vec<RecordRow>,
}

/// GET /api/v1/records/:table
///
/// Ids and tenants of rows in a tenant-scoped registry table, ordered by id.
pub async fn list_records<S: RouterState>(
    state: State<S>,
    Extension(resolution): Extension<TenantResolution>,
    Path(table): Path<String>,
    Query(query): Query<RecordsQuery>,
) -> ApiResult<Json<RecordsResponse>> {
    let spec = schema::table(&table)
        .filter(|spec| spec.tenant_scoped && spec.name != AUDIT_TABLE)
        .ok_or_else(|| {
            ApiFailure::validation(format!("{table} is not a tenant-scoped record table"))
        })?;

    let max_limit = state.integrity().config().max_limit;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT.min(max_limit));
    if limit == 0 || limit > max_limit {
        return Err(ApiFailure::validation(format!(
            "limit must be between 1 and {max_limit}"
        )));
    }

    let store = state.store();
    let tenant_id = match resolution {
        TenantResolution::Scoped { tenant_id } => Some(tenant_id),
        TenantResolution::Unscoped { .. } => None,
    };
    let filter = match tenant_id {
        Some(_) => format!("WHERE {TENANT_COLUMN} = {}", store.param(1)),
        None => String::new(),
    };
    let sql = format!(
        "SELECT id, {TENANT_COLUMN} FROM {} {filter} ORDER BY id LIMIT {limit}",
        spec.name
    );
    let binds: Vec<&str> = tenant_id.as_deref().into_iter().collect();

    let rows = store
        .fetch_text_rows(&sql, &binds, 2)
        .await?
        .into_iter()
        .map(|(id, mut values)| RecordRow {
            id,
            tenant_id: values.pop().flatten(),
        })
        .collect();

    Ok(Json(RecordsResponse {
        table: spec.name.to_string(),
        scoped: tenant_id.is_some(),
        tenant_id,
        rows,
    }))
}
