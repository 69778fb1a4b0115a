//! Query and transaction interface over the tenant database.
//!
//! `Store` wraps a PostgreSQL or SQLite pool. Integrity code builds SQL with
//! numbered placeholders from [`Store::param`] so the same statement text
//! binds a value once and may reference it several times.

use std::str::FromStr;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, Row, SqlitePool, query};

use crate::config::DatabaseConfig;
use crate::schema::{self, TABLES};

mod audit;
mod tenants;

/// A statement with its text-typed bind values, run inside a transaction.
#[derive(Debug, Clone)]
pub struct BoundStatement {
    /// Label reported when the statement fails, usually the table name
    pub label: String,
    pub sql: String,
    pub binds: Vec<String>,
}

/// Failure of one statement inside [`Store::execute_in_transaction`].
#[derive(Debug)]
pub struct TransactionFailure {
    /// Label of the failing statement
    pub label: String,
    pub source: sqlx::Error,
}

impl std::fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "statement for {} failed: {}", self.label, self.source)
    }
}

impl std::error::Error for TransactionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Store provides access to the tenant database (PostgreSQL or SQLite).
#[derive(Clone)]
pub enum Store {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Store::Postgres(_) => f.write_str("Store::Postgres"),
            Store::Sqlite(_) => f.write_str("Store::Sqlite"),
        }
    }
}

impl Store {
    /// Connect using the database configuration, creating registry tables
    /// when `bootstrap_schema` is set.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let dsn = config.dsn.as_str();
        log::info!("Connecting to tenant database with DSN: {dsn}");

        let store = if dsn.starts_with("sqlite:") {
            let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");

            // Add mode=rwc to create database file if it doesn't exist
            let dsn_with_create = if in_memory || dsn.contains("mode=") {
                dsn.to_string()
            } else if dsn.contains('?') {
                format!("{dsn}&mode=rwc")
            } else {
                format!("{dsn}?mode=rwc")
            };

            let options = SqliteConnectOptions::from_str(&dsn_with_create)?;
            // An in-memory database lives as long as its connection, so keep exactly one.
            let pool_options = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new().max_connections(config.max_connections)
            };

            let pool = pool_options
                .acquire_timeout(config.acquire_timeout)
                .connect_with(options)
                .await
                .map_err(|e| {
                    log::error!(
                        "Failed to connect to SQLite database with DSN '{dsn_with_create}': {e}"
                    );
                    e
                })?;
            Store::Sqlite(pool)
        } else {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
                .connect(dsn)
                .await
                .map_err(|e| {
                    log::error!("Failed to connect to PostgreSQL database with DSN '{dsn}': {e}");
                    e
                })?;
            Store::Postgres(pool)
        };

        log::info!("Database connection established successfully");

        if config.bootstrap_schema {
            store.bootstrap_schema().await.map_err(|e| {
                log::error!("Failed to bootstrap tenant schema: {e}");
                e
            })?;
            log::info!("Tenant schema bootstrapped ({} tables)", TABLES.len() + 1);
        }

        Ok(store)
    }

    /// In-memory SQLite store with the full registry schema.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    /// Create the tenants table and every registry table if they do not exist.
    pub async fn bootstrap_schema(&self) -> Result<(), sqlx::Error> {
        let serial = match self {
            Store::Sqlite(_) => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Store::Postgres(_) => "BIGSERIAL PRIMARY KEY",
        };

        self.execute(schema::create_tenants_sql(), &[]).await?;
        for spec in TABLES {
            let ddl = schema::create_table_sql(spec, serial);
            self.execute(&ddl, &[]).await?;
        }
        Ok(())
    }

    /// Numbered placeholder for the n-th (1-based) bind value.
    pub fn param(&self, n: usize) -> String {
        match self {
            Store::Postgres(_) => format!("${n}"),
            Store::Sqlite(_) => format!("?{n}"),
        }
    }

    /// Comma-separated placeholders `first..first + count`.
    pub fn params(&self, first: usize, count: usize) -> String {
        (first..first + count)
            .map(|n| self.param(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Run a statement that returns a single integer (e.g. `COUNT(*)`).
    pub async fn fetch_count(&self, sql: &str, binds: &[&str]) -> Result<i64, sqlx::Error> {
        match self {
            Store::Postgres(pool) => {
                let mut q = sqlx::query_scalar::<_, i64>(sql);
                for value in binds {
                    q = q.bind(*value);
                }
                q.fetch_one(pool).await
            }
            Store::Sqlite(pool) => {
                let mut q = sqlx::query_scalar::<_, i64>(sql);
                for value in binds {
                    q = q.bind(*value);
                }
                q.fetch_one(pool).await
            }
        }
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, binds: &[&str]) -> Result<u64, sqlx::Error> {
        match self {
            Store::Postgres(pool) => {
                let mut q = query(sql);
                for value in binds {
                    q = q.bind(*value);
                }
                Ok(q.execute(pool).await?.rows_affected())
            }
            Store::Sqlite(pool) => {
                let mut q = query(sql);
                for value in binds {
                    q = q.bind(*value);
                }
                Ok(q.execute(pool).await?.rows_affected())
            }
        }
    }

    /// Fetch rows whose first column is a non-null text id followed by
    /// `width - 1` nullable text columns.
    pub async fn fetch_text_rows(
        &self,
        sql: &str,
        binds: &[&str],
        width: usize,
    ) -> Result<Vec<(String, Vec<Option<String>>)>, sqlx::Error> {
        match self {
            Store::Postgres(pool) => {
                let mut q = query(sql);
                for value in binds {
                    q = q.bind(*value);
                }
                let rows = q.fetch_all(pool).await?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let id: String = row.try_get(0)?;
                    let mut values = Vec::with_capacity(width.saturating_sub(1));
                    for i in 1..width {
                        values.push(row.try_get::<Option<String>, _>(i)?);
                    }
                    out.push((id, values));
                }
                Ok(out)
            }
            Store::Sqlite(pool) => {
                let mut q = query(sql);
                for value in binds {
                    q = q.bind(*value);
                }
                let rows = q.fetch_all(pool).await?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let id: String = row.try_get(0)?;
                    let mut values = Vec::with_capacity(width.saturating_sub(1));
                    for i in 1..width {
                        values.push(row.try_get::<Option<String>, _>(i)?);
                    }
                    out.push((id, values));
                }
                Ok(out)
            }
        }
    }

    /// Run every statement in one transaction. The first failure rolls the
    /// whole transaction back; on success the affected-row count of each
    /// statement is returned in order.
    pub async fn execute_in_transaction(
        &self,
        statements: &[BoundStatement],
    ) -> Result<Vec<u64>, TransactionFailure> {
        let begin_failed = |source| TransactionFailure {
            label: "begin".to_string(),
            source,
        };
        let commit_failed = |source| TransactionFailure {
            label: "commit".to_string(),
            source,
        };

        let mut affected = Vec::with_capacity(statements.len());
        match self {
            Store::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(begin_failed)?;
                for statement in statements {
                    let mut q = query(&statement.sql);
                    for value in &statement.binds {
                        q = q.bind(value.as_str());
                    }
                    match q.execute(&mut *tx).await {
                        Ok(result) => affected.push(result.rows_affected()),
                        Err(source) => {
                            if let Err(e) = tx.rollback().await {
                                log::error!("Rollback after failed {} failed: {e}", statement.label);
                            }
                            return Err(TransactionFailure {
                                label: statement.label.clone(),
                                source,
                            });
                        }
                    }
                }
                tx.commit().await.map_err(commit_failed)?;
            }
            Store::Sqlite(pool) => {
                let mut tx = pool.begin().await.map_err(begin_failed)?;
                for statement in statements {
                    let mut q = query(&statement.sql);
                    for value in &statement.binds {
                        q = q.bind(value.as_str());
                    }
                    match q.execute(&mut *tx).await {
                        Ok(result) => affected.push(result.rows_affected()),
                        Err(source) => {
                            if let Err(e) = tx.rollback().await {
                                log::error!("Rollback after failed {} failed: {e}", statement.label);
                            }
                            return Err(TransactionFailure {
                                label: statement.label.clone(),
                                source,
                            });
                        }
                    }
                }
                tx.commit().await.map_err(commit_failed)?;
            }
        }

        Ok(affected)
    }
}
