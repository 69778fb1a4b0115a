use chrono::Utc;

use crate::model::{Tenant, TenantStatus};
use crate::schema::{self, TENANT_COLUMN};
use crate::store::Store;

/// In-memory store with seeding helpers. Helpers panic on failure.
#[derive(Debug, Clone)]
pub struct TestDb {
    pub store: Store,
}

impl TestDb {
    pub async fn new() -> Self {
        let store = Store::new_in_memory()
            .await
            .expect("in-memory store should open");
        Self { store }
    }

    /// Seeding helpers over an already connected store.
    pub fn from_store(store: Store) -> Self {
        Self { store }
    }

    pub async fn seed_tenant(&self, id: &str, slug: &str, status: TenantStatus) -> Tenant {
        let now = Utc::now();
        let tenant = Tenant {
            id: id.to_string(),
            slug: slug.to_string(),
            name: format!("{slug} Inc."),
            status,
            created_at: now,
            updated_at: now,
        };
        self.store
            .upsert_tenant(&tenant)
            .await
            .expect("tenant insert should succeed");
        tenant
    }

    /// Insert a row into a registry table. `tenant_id` is ignored for tables
    /// without a tenant column; `columns` sets foreign-key (or other) columns.
    pub async fn insert_row(
        &self,
        table: &str,
        id: &str,
        tenant_id: Option<&str>,
        columns: &[(&str, &str)],
    ) {
        let spec = schema::table(table).unwrap_or_else(|| panic!("unknown table {table}"));

        let mut names = vec!["id"];
        let mut values: Vec<Option<&str>> = vec![Some(id)];
        if spec.tenant_scoped {
            names.push(TENANT_COLUMN);
            values.push(tenant_id);
        }
        for &(column, value) in columns {
            names.push(column);
            values.push(Some(value));
        }

        // NULL is written literally so only non-null values are bound.
        let mut binds = Vec::new();
        let placeholders: Vec<String> = values
            .iter()
            .map(|value| match value {
                Some(value) => {
                    binds.push(*value);
                    self.store.param(binds.len())
                }
                None => "NULL".to_string(),
            })
            .collect();

        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );
        self.store
            .execute(&sql, &binds)
            .await
            .unwrap_or_else(|e| panic!("insert into {table} failed: {e}"));
    }

    /// Current tenant of a row; `None` when NULL. Panics if the row is gone.
    pub async fn tenant_of(&self, table: &str, id: &str) -> Option<String> {
        let sql = format!(
            "SELECT id, {TENANT_COLUMN} FROM {table} WHERE id = {}",
            self.store.param(1)
        );
        let rows = self
            .store
            .fetch_text_rows(&sql, &[id], 2)
            .await
            .unwrap_or_else(|e| panic!("select from {table} failed: {e}"));
        let (_, values) = rows
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("{table}.{id} does not exist"));
        values.into_iter().next().flatten()
    }

    pub async fn row_exists(&self, table: &str, id: &str) -> bool {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE id = {}",
            self.store.param(1)
        );
        self.store
            .fetch_count(&sql, &[id])
            .await
            .unwrap_or_else(|e| panic!("count on {table} failed: {e}"))
            > 0
    }

    pub async fn count_rows(&self, table: &str) -> i64 {
        self.store
            .fetch_count(&format!("SELECT COUNT(*) FROM {table}"), &[])
            .await
            .unwrap_or_else(|e| panic!("count on {table} failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_row_and_read_back_tenant() {
        let db = TestDb::new().await;
        db.insert_row("tasks", "task-1", None, &[("project_id", "p-1")])
            .await;
        db.insert_row("projects", "p-1", Some("t-1"), &[]).await;
        db.insert_row("task_tags", "tt-1", Some("ignored"), &[("task_id", "task-1")])
            .await;

        assert_eq!(db.tenant_of("tasks", "task-1").await, None);
        assert_eq!(db.tenant_of("projects", "p-1").await.as_deref(), Some("t-1"));
        assert!(db.row_exists("task_tags", "tt-1").await);
        assert_eq!(db.count_rows("tasks").await, 1);
    }
}
