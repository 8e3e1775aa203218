//! pgbroker Test Utilities
//!
//! Centralized test infrastructure for the pgbroker workspace:
//! - A recording executor that captures every statement in issue order
//! - Proptest generators for identifiers and provisioning requests
//! - Fixtures for common ids

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use pgbroker_core::{
    BrokerError, BrokerResult, InstanceId, ProvisionRequest, Row, ScopedConnection, SqlExecutor,
};
use proptest::prelude::*;
use uuid::Uuid;

pub use pgbroker_core::{BindingId, Identifier};

// ============================================================================
// FIXTURES
// ============================================================================

pub const INSTANCE_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const BINDING_ID: &str = "22222222-2222-2222-2222-222222222222";

pub fn instance_id() -> InstanceId {
    InstanceId::parse(INSTANCE_ID).expect("fixture id is valid")
}

pub fn binding_id() -> BindingId {
    BindingId::parse(BINDING_ID).expect("fixture id is valid")
}

pub fn provision_request() -> ProvisionRequest {
    ProvisionRequest::new(instance_id(), "svc-id", "plan-id", "org-guid", "space-guid")
}

// ============================================================================
// RECORDING EXECUTOR
// ============================================================================

/// Where a recorded statement was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Admin,
    Scoped(String),
}

/// A statement as seen by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub target: Target,
    pub sql: String,
    pub params: Vec<String>,
}

#[derive(Debug, Default)]
struct Recording {
    log: Vec<Recorded>,
    failures: Vec<String>,
    responses: Vec<(String, Vec<Row>)>,
    opened: Vec<String>,
    closed: Vec<String>,
    refuse_scoped: bool,
}

/// In-memory [`SqlExecutor`] that records statements instead of running them.
///
/// Statements containing a substring registered with [`fail_on`] fail;
/// queries containing a substring registered with [`respond`] return the
/// scripted rows. Scoped connections record into the same log, tagged with
/// their database, and register their release in [`closed_scopes`].
///
/// [`fail_on`]: RecordingExecutor::fail_on
/// [`respond`]: RecordingExecutor::respond
/// [`closed_scopes`]: RecordingExecutor::closed_scopes
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Make every statement containing `pattern` fail.
    pub fn fail_on(&self, pattern: impl Into<String>) -> &Self {
        self.lock().failures.push(pattern.into());
        self
    }

    /// Return `rows` for every query containing `pattern`.
    pub fn respond(&self, pattern: impl Into<String>, rows: Vec<Row>) -> &Self {
        self.lock().responses.push((pattern.into(), rows));
        self
    }

    /// Make `open_scoped` fail.
    pub fn refuse_scoped_connections(&self) -> &Self {
        self.lock().refuse_scoped = true;
        self
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.lock().log.clone()
    }

    /// Every statement, in issue order, regardless of target.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.iter().map(|r| r.sql.clone()).collect()
    }

    pub fn admin_statements(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|r| r.target == Target::Admin)
            .map(|r| r.sql.clone())
            .collect()
    }

    pub fn scoped_statements(&self, database: &str) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|r| r.target == Target::Scoped(database.to_string()))
            .map(|r| r.sql.clone())
            .collect()
    }

    pub fn opened_scopes(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn closed_scopes(&self) -> Vec<String> {
        self.lock().closed.clone()
    }

    /// Index of the first statement containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.lock().log.iter().position(|r| r.sql.contains(pattern))
    }

    fn record(&self, target: Target, sql: &str, params: &[&str]) -> BrokerResult<()> {
        let mut recording = self.lock();
        recording.log.push(Recorded {
            target,
            sql: sql.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        });
        if recording.failures.iter().any(|f| sql.contains(f.as_str())) {
            return Err(BrokerError::statement_failure(sql, "scripted failure"));
        }
        Ok(())
    }

    fn rows_for(&self, sql: &str) -> Vec<Row> {
        self.lock()
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn try_execute(&self, statement: &str) -> BrokerResult<()> {
        self.record(Target::Admin, statement, &[])
    }

    async fn query_one(&self, statement: &str) -> BrokerResult<Row> {
        self.record(Target::Admin, statement, &[])?;
        Ok(self.rows_for(statement).into_iter().next().unwrap_or_default())
    }

    async fn parameterized_update(&self, statement: &str, params: &[&str]) -> BrokerResult<u64> {
        self.record(Target::Admin, statement, params)?;
        Ok(1)
    }

    async fn parameterized_query_one(
        &self,
        statement: &str,
        params: &[&str],
    ) -> BrokerResult<Row> {
        self.record(Target::Admin, statement, params)?;
        Ok(self.rows_for(statement).into_iter().next().unwrap_or_default())
    }

    async fn parameterized_query(
        &self,
        statement: &str,
        params: &[&str],
    ) -> BrokerResult<Vec<Row>> {
        self.record(Target::Admin, statement, params)?;
        Ok(self.rows_for(statement))
    }

    async fn open_scoped(&self, database: &InstanceId) -> BrokerResult<Box<dyn ScopedConnection>> {
        let mut recording = self.lock();
        if recording.refuse_scoped {
            return Err(BrokerError::connection(format!(
                "scripted refusal for database {}",
                database
            )));
        }
        recording.opened.push(database.to_string());
        Ok(Box::new(RecordingScope {
            database: database.to_string(),
            parent: self.clone(),
            released: false,
        }))
    }
}

struct RecordingScope {
    database: String,
    parent: RecordingExecutor,
    released: bool,
}

impl RecordingScope {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.parent.lock().closed.push(self.database.clone());
        }
    }
}

#[async_trait]
impl ScopedConnection for RecordingScope {
    fn database(&self) -> &str {
        &self.database
    }

    async fn try_execute(&self, statement: &str) -> BrokerResult<()> {
        self.parent
            .record(Target::Scoped(self.database.clone()), statement, &[])
    }

    async fn close(mut self: Box<Self>) {
        self.release();
    }
}

impl Drop for RecordingScope {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Canonical lowercase UUID strings.
pub fn arb_uuid_string() -> impl Strategy<Value = String> {
    any::<[u8; 16]>().prop_map(|bytes| Uuid::from_bytes(bytes).hyphenated().to_string())
}

pub fn arb_instance_id() -> impl Strategy<Value = InstanceId> {
    arb_uuid_string().prop_map(|s| InstanceId::parse(s).expect("generated uuid is valid"))
}

/// Strings that are never canonical UUIDs, including injection attempts.
pub fn arb_invalid_identifier() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z0-9_]{0,35}",
        "[a-z0-9_]{37,48}",
        arb_uuid_string().prop_map(|s| format!("{s}\"; DROP DATABASE postgres; --")),
        arb_uuid_string().prop_map(|s| s.replace('-', "")),
        arb_uuid_string().prop_map(|s| format!("{{{s}}}")),
        arb_uuid_string().prop_map(|s| format!("{}\"", &s[..35])),
    ]
}

pub fn arb_provision_request() -> impl Strategy<Value = ProvisionRequest> {
    (
        arb_instance_id(),
        "[a-z0-9-]{1,36}",
        "[a-z0-9-]{1,36}",
        "[a-z0-9-]{1,36}",
        "[a-z0-9-]{1,36}",
    )
        .prop_map(|(id, svc, plan, org, space)| ProvisionRequest::new(id, svc, plan, org, space))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_captures_order_and_failures() {
        let exec = RecordingExecutor::new();
        exec.fail_on("GRANT");

        assert!(exec.execute("CREATE ROLE x").await.is_executed());
        assert!(!exec.execute("GRANT x TO y").await.is_executed());
        assert_eq!(exec.statements(), vec!["CREATE ROLE x", "GRANT x TO y"]);
        assert_eq!(exec.position("GRANT"), Some(1));
    }

    #[tokio::test]
    async fn test_scoped_release_on_drop() {
        let exec = RecordingExecutor::new();
        {
            let scope = exec.open_scoped(&instance_id()).await.unwrap();
            scope.try_execute("SELECT 1").await.unwrap();
        }
        assert_eq!(exec.opened_scopes(), vec![INSTANCE_ID.to_string()]);
        assert_eq!(exec.closed_scopes(), vec![INSTANCE_ID.to_string()]);
        assert_eq!(exec.scoped_statements(INSTANCE_ID), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_scripted_rows() {
        let exec = RecordingExecutor::new();
        exec.respond("current_user", vec![Row::new().with("current_user", "admin")]);
        let row = exec.query_one("SELECT current_user").await.unwrap();
        assert_eq!(row.get("current_user"), Some("admin"));
        assert!(exec.query_one("SELECT 1").await.unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_invalid_generator_never_valid(s in arb_invalid_identifier()) {
            prop_assert!(InstanceId::parse(s).is_err());
        }
    }
}
