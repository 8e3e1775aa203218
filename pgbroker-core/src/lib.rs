//! pgbroker Core - Types for the tenant database lifecycle
//!
//! Pure data types and leaf components shared by every other crate:
//! validated identifiers, instance metadata, credential generation, policy
//! switches, the error taxonomy, and the SQL execution capability trait.
//! Nothing in this crate opens a connection.

pub mod credential;
pub mod error;
pub mod executor;
pub mod identity;
pub mod instance;
pub mod policy;

pub use credential::{Password, PASSWORD_ALPHABET, PASSWORD_LEN};
pub use error::{BrokerError, BrokerResult, ConfigError};
pub use executor::{redact, Row, ScopedConnection, SqlExecutor, StatementOutcome};
pub use identity::{quote_ident, validate_uuid, BindingId, Identifier, InstanceId, RoleName};
pub use instance::{ProvisionRequest, ServiceInstance};
pub use policy::{BindingIdentity, FailurePolicy};
