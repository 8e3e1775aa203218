//! Behavioural switches for the lifecycle sequences.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How application bindings map onto database roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingIdentity {
    /// Every binding receives the instance role and its stored password.
    #[default]
    Shared,
    /// Each binding gets its own login role that inherits the instance role.
    PerBinding,
}

/// What a lifecycle sequence does when a DDL step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log the failure and run the remaining steps.
    #[default]
    BestEffort,
    /// Stop at the first failed step and return the error.
    FailFast,
}

impl FromStr for BindingIdentity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "per-binding" | "per_binding" => Ok(Self::PerBinding),
            other => Err(ConfigError::InvalidValue {
                field: "binding_identity".to_string(),
                value: other.to_string(),
                reason: "expected 'shared' or 'per-binding'".to_string(),
            }),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            "fail-fast" | "fail_fast" => Ok(Self::FailFast),
            other => Err(ConfigError::InvalidValue {
                field: "failure_policy".to_string(),
                value: other.to_string(),
                reason: "expected 'best-effort' or 'fail-fast'".to_string(),
            }),
        }
    }
}

impl fmt::Display for BindingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::PerBinding => f.write_str("per-binding"),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BestEffort => f.write_str("best-effort"),
            Self::FailFast => f.write_str("fail-fast"),
        }
    }
}
