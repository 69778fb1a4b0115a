//! Test utilities for tenantguard.
//!
//! Reusable builders for test configurations, an in-memory seeded database
//! and audit sinks that record or fail on demand.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::{TestConfigBuilder, TestDb};
//!
//! let config = TestConfigBuilder::new().strict().with_admin_key("k", "ops").build();
//! let db = TestDb::new().await;
//! db.seed_tenant("t1", "acme", TenantStatus::Active).await;
//! db.insert_row("projects", "p1", Some("t1"), &[]).await;
//! ```

mod audit_sinks;
mod config_builder;
mod db;

pub use audit_sinks::{FailingAuditSink, RecordingAuditSink};
pub use config_builder::TestConfigBuilder;
pub use db::TestDb;
