pub mod audit;
pub mod auth;
pub mod cli;
pub mod config;
pub mod model;
pub mod schema;
pub mod store;
pub mod tenancy;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use audit::{AuditSink, AuditTrail};
pub use store::Store;
pub use tenancy::{QuarantineTenant, TenancyMode, TenancyPolicy};
