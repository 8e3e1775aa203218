//! Error types for pgbroker operations

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all lifecycle operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// A tenant-supplied identifier failed validation. Raised before any
    /// statement is built, so no SQL has been issued when this is returned.
    #[error("Invalid identifier for {field}: '{value}'")]
    InvalidIdentifier { field: String, value: String },

    #[error("Statement failed: {statement}: {reason}")]
    StatementFailure { statement: String, reason: String },

    #[error("Service instance {instance_id} not found")]
    NotFound { instance_id: String },

    #[error("Connection error: {reason}")]
    Connection { reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl BrokerError {
    pub fn invalid_identifier(field: &str, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn statement_failure(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StatementFailure {
            statement: statement.into(),
            reason: reason.into(),
        }
    }

    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// True when the error was raised by identifier validation.
    pub fn is_invalid_identifier(&self) -> bool {
        matches!(self, Self::InvalidIdentifier { .. })
    }
}

/// Result type alias for pgbroker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identifier_display() {
        let err = BrokerError::invalid_identifier("instance_id", "robert'); DROP");
        let msg = err.to_string();
        assert!(msg.contains("instance_id"));
        assert!(msg.contains("robert'); DROP"));
        assert!(err.is_invalid_identifier());
    }

    #[test]
    fn test_config_error_converts() {
        let err: BrokerError = ConfigError::MissingRequired {
            field: "MASTER_DB_URL".to_string(),
        }
        .into();
        assert!(matches!(err, BrokerError::Config(_)));
        assert!(err.to_string().contains("MASTER_DB_URL"));
        assert!(!err.is_invalid_identifier());
    }
}
