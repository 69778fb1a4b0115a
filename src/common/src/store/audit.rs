use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Store;
use crate::model::{AuditEvent, AuditPage, NewAuditEvent};

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    tenant_id: Option<String>,
    event_type: String,
    message: String,
    actor_id: Option<String>,
    actor_email: Option<String>,
    actor_name: Option<String>,
    metadata: Option<String>,
    created_at: String,
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = sqlx::Error;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "created_at".to_string(),
                source: Box::new(e),
            })?
            .with_timezone(&Utc);
        // Metadata that is not valid JSON is surfaced as a plain string.
        let metadata = row.metadata.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        });

        Ok(AuditEvent {
            id: row.id,
            tenant_id: row.tenant_id,
            event_type: row.event_type,
            message: row.message,
            actor_id: row.actor_id,
            actor_email: row.actor_email,
            actor_name: row.actor_name,
            metadata,
            created_at,
        })
    }
}

impl Store {
    /// Append one audit event and return its id.
    pub async fn insert_audit_event(&self, event: &NewAuditEvent) -> Result<String, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        let metadata = event.metadata.as_ref().map(|value| value.to_string());
        let sql = format!(
            "INSERT INTO audit_events (id, tenant_id, event_type, message, actor_id, metadata, created_at) \
             VALUES ({})",
            self.params(1, 7)
        );

        match self {
            Store::Postgres(pool) => {
                sqlx::query(&sql)
                    .bind(&id)
                    .bind(&event.tenant_id)
                    .bind(&event.event_type)
                    .bind(&event.message)
                    .bind(&event.actor_id)
                    .bind(&metadata)
                    .bind(&created_at)
                    .execute(pool)
                    .await?;
            }
            Store::Sqlite(pool) => {
                sqlx::query(&sql)
                    .bind(&id)
                    .bind(&event.tenant_id)
                    .bind(&event.event_type)
                    .bind(&event.message)
                    .bind(&event.actor_id)
                    .bind(&metadata)
                    .bind(&created_at)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(id)
    }

    /// One page of audit events, newest first, optionally restricted to a
    /// tenant. Actor email and name are joined from `users` when the actor is
    /// a user id.
    pub async fn list_audit_events(
        &self,
        tenant_id: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<AuditPage, sqlx::Error> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = u64::from(page - 1) * u64::from(per_page);

        let filter = match tenant_id {
            Some(_) => format!("WHERE a.tenant_id = {}", self.param(1)),
            None => String::new(),
        };
        let binds: Vec<&str> = tenant_id.into_iter().collect();

        let total = self
            .fetch_count(&format!("SELECT COUNT(*) FROM audit_events a {filter}"), &binds)
            .await?;

        let sql = format!(
            "SELECT a.id, a.tenant_id, a.event_type, a.message, a.actor_id, \
                    u.email AS actor_email, u.name AS actor_name, a.metadata, a.created_at \
             FROM audit_events a LEFT JOIN users u ON u.id = a.actor_id \
             {filter} ORDER BY a.seq DESC LIMIT {per_page} OFFSET {offset}"
        );

        let rows = match self {
            Store::Postgres(pool) => {
                let mut q = sqlx::query_as::<_, AuditRow>(&sql);
                for value in &binds {
                    q = q.bind(*value);
                }
                q.fetch_all(pool).await?
            }
            Store::Sqlite(pool) => {
                let mut q = sqlx::query_as::<_, AuditRow>(&sql);
                for value in &binds {
                    q = q.bind(*value);
                }
                q.fetch_all(pool).await?
            }
        };

        let events = rows
            .into_iter()
            .map(AuditEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuditPage {
            events,
            total,
            page,
            per_page,
        })
    }
}
