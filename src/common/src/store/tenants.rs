use chrono::{DateTime, Utc};

use super::Store;
use crate::model::{Tenant, TenantStatus};

const TENANT_COLUMNS: &str = "id, slug, name, status, created_at, updated_at";

fn decode_error(column: &str, message: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.to_string().into(),
    }
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| decode_error(column, e))
}

/// Raw tenant row; timestamps and status are stored as text.
#[derive(sqlx::FromRow)]
struct TenantRow {
    id: String,
    slug: String,
    name: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = sqlx::Error;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            status: row
                .status
                .parse::<TenantStatus>()
                .map_err(|e| decode_error("status", e))?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            id: row.id,
            slug: row.slug,
            name: row.name,
        })
    }
}

impl Store {
    async fn fetch_tenant(&self, column: &str, value: &str) -> Result<Option<Tenant>, sqlx::Error> {
        let sql = format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE {column} = {}",
            self.param(1)
        );
        match self {
            Store::Postgres(pool) => sqlx::query_as::<_, TenantRow>(&sql)
                .bind(value)
                .fetch_optional(pool)
                .await?
                .map(Tenant::try_from)
                .transpose(),
            Store::Sqlite(pool) => sqlx::query_as::<_, TenantRow>(&sql)
                .bind(value)
                .fetch_optional(pool)
                .await?
                .map(Tenant::try_from)
                .transpose(),
        }
    }

    pub async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>, sqlx::Error> {
        self.fetch_tenant("id", id).await
    }

    pub async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, sqlx::Error> {
        self.fetch_tenant("slug", slug).await
    }

    /// Resolve a tenant by id, falling back to slug.
    pub async fn find_tenant(&self, id_or_slug: &str) -> Result<Option<Tenant>, sqlx::Error> {
        match self.get_tenant(id_or_slug).await? {
            Some(tenant) => Ok(Some(tenant)),
            None => self.find_tenant_by_slug(id_or_slug).await,
        }
    }

    /// Insert a tenant row, replacing name and status when the id already exists.
    pub async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), sqlx::Error> {
        let sql = format!(
            "INSERT INTO tenants ({TENANT_COLUMNS}) VALUES ({}) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, status = excluded.status, \
             updated_at = excluded.updated_at",
            self.params(1, 6)
        );
        let created_at = tenant.created_at.to_rfc3339();
        let updated_at = tenant.updated_at.to_rfc3339();
        self.execute(
            &sql,
            &[
                tenant.id.as_str(),
                tenant.slug.as_str(),
                tenant.name.as_str(),
                tenant.status.as_str(),
                created_at.as_str(),
                updated_at.as_str(),
            ],
        )
        .await?;
        log::debug!("Upserted tenant {} ({})", tenant.slug, tenant.id);
        Ok(())
    }

    /// Change a tenant's status; returns `false` when no such tenant exists.
    pub async fn set_tenant_status(
        &self,
        id: &str,
        status: TenantStatus,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE tenants SET status = {}, updated_at = {} WHERE id = {}",
            self.param(1),
            self.param(2),
            self.param(3)
        );
        let now = Utc::now().to_rfc3339();
        let affected = self.execute(&sql, &[status.as_str(), now.as_str(), id]).await?;
        Ok(affected > 0)
    }

    /// Number of active tenants, not counting `excluding` when given.
    pub async fn count_active_tenants(&self, excluding: Option<&str>) -> Result<i64, sqlx::Error> {
        match excluding {
            Some(id) => {
                let sql = format!(
                    "SELECT COUNT(*) FROM tenants WHERE status = 'active' AND id <> {}",
                    self.param(1)
                );
                self.fetch_count(&sql, &[id]).await
            }
            None => {
                self.fetch_count("SELECT COUNT(*) FROM tenants WHERE status = 'active'", &[])
                    .await
            }
        }
    }
}
