//! Identifier types embedded into DDL.
//!
//! Database and role names cannot be bound as statement parameters, so every
//! name that reaches a `CREATE`/`GRANT`/`DROP` string is one of the types in
//! this module, and the only way to obtain one is through validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BrokerError, BrokerResult};

/// Length of the canonical hyphenated UUID form.
const CANONICAL_UUID_LEN: usize = 36;

/// PostgreSQL truncates identifiers beyond this many bytes (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// A name that may be interpolated into DDL as a quoted identifier.
pub trait Identifier {
    /// Raw identifier text as PostgreSQL will see it.
    fn as_str(&self) -> &str;

    /// Double-quoted form with embedded quotes doubled.
    fn quoted(&self) -> String {
        quote_ident(self.as_str())
    }
}

/// Quote `name` as a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check that `value` is a UUID in canonical textual form
/// (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`).
///
/// Braced, URN and unhyphenated spellings are rejected even though they parse
/// as UUIDs; the identifier doubles as a database name and must match what the
/// platform passes on every later call.
pub fn validate_uuid(field: &str, value: &str) -> BrokerResult<()> {
    if value.len() != CANONICAL_UUID_LEN || Uuid::try_parse(value).is_err() {
        return Err(BrokerError::invalid_identifier(field, value));
    }
    Ok(())
}

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap `value`.
            pub fn parse(value: impl Into<String>) -> BrokerResult<Self> {
                let value = value.into();
                validate_uuid($field, &value)?;
                Ok(Self(value))
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().hyphenated().to_string())
            }
        }

        impl Identifier for $name {
            fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = BrokerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = BrokerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_identifier!(
    /// Identifier of a provisioned instance. Doubles as the tenant database
    /// name and the tenant role name.
    InstanceId,
    "instance_id"
);

uuid_identifier!(
    /// Identifier of an application binding.
    BindingId,
    "binding_id"
);

/// A role name that is not tenant-supplied (the administrative role, or the
/// `current_user` reported by the server).
///
/// These are not UUID-shaped, so validation is limited to what PostgreSQL
/// itself accepts; injection safety comes from always emitting the quoted form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    pub fn parse(value: impl Into<String>) -> BrokerResult<Self> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_IDENTIFIER_BYTES || value.contains('\0') {
            return Err(BrokerError::invalid_identifier("role_name", value));
        }
        Ok(Self(value))
    }
}

impl Identifier for RoleName {
    fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoleName {
    type Error = BrokerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoleName> for String {
    fn from(role: RoleName) -> Self {
        role.0
    }
}
