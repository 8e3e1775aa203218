//! SQL execution capability.
//!
//! Components never hold a connection directly; they receive an
//! `Arc<dyn SqlExecutor>` and issue statements through it. The PostgreSQL
//! implementation lives in `pgbroker-db`, the recording implementation used by
//! tests lives in `pgbroker-test-utils`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{BrokerError, BrokerResult};
use crate::identity::InstanceId;
use crate::policy::FailurePolicy;

/// One result row, every column rendered as a string.
///
/// A query that matched nothing yields an empty row, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(BTreeMap<String, String>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    /// Column value, or the empty string when the column is absent.
    pub fn get_or_blank(&self, column: &str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of a fire-and-forget statement.
///
/// `execute` never raises; a failure is logged and reported here so each call
/// site decides whether to continue or stop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "check the outcome or call `required()` to propagate failures"]
pub enum StatementOutcome {
    Executed,
    FailedContinued(BrokerError),
}

impl StatementOutcome {
    /// Build an outcome from a raw execution result, logging failures.
    pub fn from_result(statement: &str, result: BrokerResult<()>) -> Self {
        match result {
            Ok(()) => {
                debug!(statement = %redact(statement), "Statement executed");
                Self::Executed
            }
            Err(err) => {
                error!(
                    statement = %redact(statement),
                    error = %err,
                    "Error while executing statement, continuing"
                );
                Self::FailedContinued(err)
            }
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed)
    }

    /// Convert to a result, for call sites that must stop on failure.
    pub fn required(self) -> BrokerResult<()> {
        match self {
            Self::Executed => Ok(()),
            Self::FailedContinued(err) => Err(err),
        }
    }

    /// Apply a sequence's failure policy: best-effort swallows the failure
    /// (already logged), fail-fast propagates it.
    pub fn under(self, policy: FailurePolicy) -> BrokerResult<()> {
        match policy {
            FailurePolicy::BestEffort => Ok(()),
            FailurePolicy::FailFast => self.required(),
        }
    }
}

/// Statement execution against one connection target.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a statement with no result expectation, propagating failure.
    async fn try_execute(&self, statement: &str) -> BrokerResult<()>;

    /// Run a statement returning at most one row. Empty row if none matched.
    async fn query_one(&self, statement: &str) -> BrokerResult<Row>;

    /// Run a statement with `$1..$n` placeholders bound to `params` in order.
    /// Returns the number of affected rows.
    async fn parameterized_update(&self, statement: &str, params: &[&str]) -> BrokerResult<u64>;

    /// Parameterized variant of [`SqlExecutor::query_one`].
    async fn parameterized_query_one(&self, statement: &str, params: &[&str])
        -> BrokerResult<Row>;

    /// Run a parameterized query returning every row.
    async fn parameterized_query(&self, statement: &str, params: &[&str])
        -> BrokerResult<Vec<Row>>;

    /// Open a short-lived connection whose current database is `database`.
    ///
    /// Callers must [`ScopedConnection::close`] it; implementations also
    /// release the connection on drop.
    async fn open_scoped(&self, database: &InstanceId) -> BrokerResult<Box<dyn ScopedConnection>>;

    /// Run a statement with no result expectation. Failures are logged and
    /// returned as [`StatementOutcome::FailedContinued`], never raised.
    async fn execute(&self, statement: &str) -> StatementOutcome {
        let result = self.try_execute(statement).await;
        StatementOutcome::from_result(statement, result)
    }
}

/// A connection scoped to one tenant database.
#[async_trait]
pub trait ScopedConnection: Send + Sync {
    /// Database this connection is attached to.
    fn database(&self) -> &str;

    async fn try_execute(&self, statement: &str) -> BrokerResult<()>;

    async fn execute(&self, statement: &str) -> StatementOutcome {
        let result = self.try_execute(statement).await;
        StatementOutcome::from_result(statement, result)
    }

    /// Release the connection.
    async fn close(self: Box<Self>);
}

/// Mask password literals so statements can be logged.
pub fn redact(statement: &str) -> String {
    const MARKER: &str = "PASSWORD '";

    let upper = statement.to_ascii_uppercase();
    let Some(start) = upper.find(MARKER) else {
        return statement.to_string();
    };
    let literal_start = start + MARKER.len();

    let bytes = statement.as_bytes();
    let mut end = literal_start;
    while end < bytes.len() {
        if bytes[end] == b'\'' {
            if bytes.get(end + 1) == Some(&b'\'') {
                end += 2;
                continue;
            }
            break;
        }
        end += 1;
    }

    format!(
        "{}***{}",
        &statement[..literal_start],
        &statement[end.min(statement.len())..]
    )
}
