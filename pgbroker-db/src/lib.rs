//! pgbroker DB - PostgreSQL tenant provisioning
//!
//! Creates isolated tenant databases and roles on a shared PostgreSQL server,
//! records them in a metadata table, and hands out connection URIs to
//! applications. All statements go through an injected
//! [`pgbroker_core::SqlExecutor`]; [`PgExecutor`] is the production
//! implementation.

pub mod admin;
pub mod binding;
pub mod broker;
pub mod config;
pub mod db;
pub mod provisioner;
pub mod repository;
pub mod roles;
pub mod sql;
pub mod telemetry;

// Re-export commonly used types
pub use admin::{AdminUrl, DEFAULT_PORT};
pub use binding::BindingManager;
pub use broker::Broker;
pub use config::BrokerConfig;
pub use db::{create_pool, PgExecutor, PgScopedConnection};
pub use provisioner::InstanceProvisioner;
pub use repository::InstanceRepository;
pub use roles::RoleManager;
pub use telemetry::{init_tracing, TelemetryError};
