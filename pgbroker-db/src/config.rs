//! Broker Configuration Module
//!
//! Configuration is loaded from environment variables with defaults suitable
//! for a single shared PostgreSQL server.

use std::time::Duration;

use pgbroker_core::{BindingIdentity, BrokerResult, ConfigError, FailurePolicy, RoleName};

use crate::admin::AdminUrl;

/// Primary variable holding the administrative connection URL.
pub const MASTER_DB_URL: &str = "MASTER_DB_URL";
/// Accepted for deployments configured with a JDBC-style URL.
pub const MASTER_JDBC_URL: &str = "MASTER_JDBC_URL";

/// Configuration for the provisioning engine.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Administrative connection URL.
    pub admin_url: AdminUrl,
    /// Role granted membership in every tenant role.
    pub admin_role: RoleName,
    /// How bindings map to database roles.
    pub binding_identity: BindingIdentity,
    /// What lifecycle sequences do when a DDL step fails.
    pub failure_policy: FailurePolicy,
    /// Maximum administrative pool size.
    pub pool_size: usize,
    /// Timeout for acquiring or opening a connection.
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    /// Build a configuration for `admin_url` with default settings. The admin
    /// role defaults to the user named in the URL.
    pub fn new(admin_url: AdminUrl) -> BrokerResult<Self> {
        let user = admin_url.user().ok_or_else(|| ConfigError::MissingRequired {
            field: "user in MASTER_DB_URL".to_string(),
        })?;
        let admin_role = RoleName::parse(user)?;

        Ok(Self {
            admin_url,
            admin_role,
            binding_identity: BindingIdentity::default(),
            failure_policy: FailurePolicy::default(),
            pool_size: 4,
            connect_timeout: Duration::from_secs(30),
        })
    }

    /// Create BrokerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `MASTER_DB_URL` (or `MASTER_JDBC_URL`): administrative connection URL (required)
    /// - `PGBROKER_ADMIN_ROLE`: role receiving tenant role membership (default: URL user)
    /// - `PGBROKER_BINDING_IDENTITY`: "shared" or "per-binding" (default: shared)
    /// - `PGBROKER_FAILURE_POLICY`: "best-effort" or "fail-fast" (default: best-effort)
    /// - `PGBROKER_POOL_SIZE`: administrative pool size (default: 4)
    /// - `PGBROKER_CONNECT_TIMEOUT_SECS`: connection timeout (default: 30)
    pub fn from_env() -> BrokerResult<Self> {
        let raw_url = std::env::var(MASTER_DB_URL)
            .or_else(|_| std::env::var(MASTER_JDBC_URL))
            .map_err(|_| ConfigError::MissingRequired {
                field: MASTER_DB_URL.to_string(),
            })?;

        let mut config = Self::new(AdminUrl::parse(&raw_url)?)?;

        if let Ok(role) = std::env::var("PGBROKER_ADMIN_ROLE") {
            config.admin_role = RoleName::parse(role)?;
        }

        if let Ok(value) = std::env::var("PGBROKER_BINDING_IDENTITY") {
            config.binding_identity = value.parse()?;
        }

        if let Ok(value) = std::env::var("PGBROKER_FAILURE_POLICY") {
            config.failure_policy = value.parse()?;
        }

        config.pool_size = std::env::var("PGBROKER_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|size| *size > 0)
            .unwrap_or(config.pool_size);

        config.connect_timeout = std::env::var("PGBROKER_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.connect_timeout);

        Ok(config)
    }

    pub fn with_binding_identity(mut self, binding_identity: BindingIdentity) -> Self {
        self.binding_identity = binding_identity;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_admin_role(mut self, admin_role: RoleName) -> Self {
        self.admin_role = admin_role;
        self
    }
}
