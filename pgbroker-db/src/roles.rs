//! Tenant role creation and privilege setup.
//!
//! Default privileges and `ALL TABLES IN SCHEMA` grants apply to the current
//! database of the connection that issues them. The administrative connection
//! is attached to a different database, so those statements go through a
//! short-lived connection opened on the tenant database itself.

use std::sync::Arc;

use pgbroker_core::{
    BindingId, BrokerResult, FailurePolicy, Identifier, InstanceId, Password, RoleName,
    SqlExecutor,
};
use tracing::{info, warn};

use crate::sql;

/// Creates, grants, and drops tenant roles.
#[derive(Clone)]
pub struct RoleManager {
    executor: Arc<dyn SqlExecutor>,
    admin_role: RoleName,
    policy: FailurePolicy,
}

impl RoleManager {
    pub fn new(executor: Arc<dyn SqlExecutor>, admin_role: RoleName, policy: FailurePolicy) -> Self {
        Self {
            executor,
            admin_role,
            policy,
        }
    }

    pub fn admin_role(&self) -> &RoleName {
        &self.admin_role
    }

    async fn run(&self, statement: String) -> BrokerResult<()> {
        self.executor.execute(&statement).await.under(self.policy)
    }

    /// Create the instance role and give it full control of its database.
    ///
    /// The database must already exist. Steps run in order: create role,
    /// grant it to the admin role, grant database privileges, set default
    /// privileges from inside the tenant database, hand over ownership.
    pub async fn create_role(&self, instance_id: &InstanceId) -> BrokerResult<()> {
        info!(instance_id = %instance_id, "Creating instance role");

        self.run(sql::create_role(instance_id)).await?;
        self.run(sql::grant_role(instance_id, &self.admin_role)).await?;
        self.run(sql::grant_all_on_database(instance_id, instance_id))
            .await?;

        let mut scoped = vec![sql::grant_all_tables(instance_id)];
        scoped.extend(
            sql::DEFAULT_PRIVILEGE_OBJECTS
                .iter()
                .map(|objects| sql::alter_default_privileges(instance_id, objects, instance_id)),
        );
        self.run_scoped(instance_id, &scoped).await?;

        self.run(sql::alter_database_owner(instance_id, instance_id))
            .await?;

        info!(instance_id = %instance_id, "Instance role ready");
        Ok(())
    }

    /// Create a login role for one binding that inherits the instance role.
    pub async fn create_binding_role(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
        password: &Password,
    ) -> BrokerResult<()> {
        info!(instance_id = %instance_id, binding_id = %binding_id, "Creating binding role");

        self.run(sql::create_role(binding_id)).await?;
        self.run(sql::set_login_password(binding_id, password))
            .await?;
        self.run(sql::grant_role(instance_id, binding_id)).await?;
        self.run(sql::set_inherit(binding_id)).await?;
        self.run(sql::grant_all_on_database(instance_id, binding_id))
            .await?;

        self.run_scoped(instance_id, &[sql::grant_all_tables(binding_id)])
            .await
    }

    /// Enable login on `role` with `password`.
    pub async fn enable_login(&self, role: &impl Identifier, password: &Password) -> BrokerResult<()> {
        self.run(sql::set_login_password(role, password)).await
    }

    /// Disable login on the binding role and withdraw its membership in the
    /// instance role. The role itself is kept.
    pub async fn revoke_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> BrokerResult<()> {
        info!(instance_id = %instance_id, binding_id = %binding_id, "Revoking binding access");
        self.run(sql::set_nologin(binding_id)).await?;
        self.run(sql::revoke_role(instance_id, binding_id)).await
    }

    /// True when a role named `role` exists on the server.
    pub async fn role_exists(&self, role: &impl Identifier) -> BrokerResult<bool> {
        let row = self
            .executor
            .parameterized_query_one(sql::SELECT_ROLE, &[role.as_str()])
            .await?;
        Ok(!row.is_empty())
    }

    /// `DROP ROLE IF EXISTS`; dropping a missing role is not an error.
    pub async fn drop_role(&self, role: &impl Identifier) -> BrokerResult<()> {
        info!(role = %role.as_str(), "Dropping role");
        self.run(sql::drop_role(role)).await
    }

    /// Run `statements` in order on a connection attached to the tenant
    /// database. The connection is closed on every exit path.
    async fn run_scoped(&self, database: &InstanceId, statements: &[String]) -> BrokerResult<()> {
        let conn = self.executor.open_scoped(database).await?;

        let mut result = Ok(());
        for statement in statements {
            if let Err(e) = conn.execute(statement).await.under(self.policy) {
                warn!(database = %database, error = %e, "Stopping scoped statements");
                result = Err(e);
                break;
            }
        }

        conn.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgbroker_core::{BrokerError, Row};
    use pgbroker_test_utils::{binding_id, instance_id, RecordingExecutor, BINDING_ID, INSTANCE_ID};

    fn manager(exec: &RecordingExecutor, policy: FailurePolicy) -> RoleManager {
        RoleManager::new(
            Arc::new(exec.clone()),
            RoleName::parse("pgadmin").unwrap(),
            policy,
        )
    }

    fn quoted(id: &str) -> String {
        format!("\"{}\"", id)
    }

    #[tokio::test]
    async fn test_create_role_sequence() {
        let exec = RecordingExecutor::new();
        manager(&exec, FailurePolicy::BestEffort)
            .create_role(&instance_id())
            .await
            .unwrap();

        let id = quoted(INSTANCE_ID);
        assert_eq!(
            exec.admin_statements(),
            vec![
                format!("CREATE ROLE {id}"),
                format!("GRANT {id} TO \"pgadmin\""),
                format!("GRANT ALL ON DATABASE {id} TO {id}"),
                format!("ALTER DATABASE {id} OWNER TO {id}"),
            ]
        );

        let scoped = exec.scoped_statements(INSTANCE_ID);
        assert_eq!(scoped.len(), 4);
        assert_eq!(
            scoped[0],
            format!("GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO {id}")
        );
        for (statement, objects) in scoped[1..].iter().zip(sql::DEFAULT_PRIVILEGE_OBJECTS) {
            assert!(statement.starts_with(&format!("ALTER DEFAULT PRIVILEGES FOR ROLE {id}")));
            assert!(statement.contains(&format!("GRANT ALL ON {objects} TO {id}")));
        }

        // Default privileges are set before ownership moves to the tenant.
        let last_scoped = exec.position("GRANT ALL ON FUNCTIONS").unwrap();
        assert!(last_scoped < exec.position("OWNER TO").unwrap());
        assert_eq!(exec.opened_scopes(), vec![INSTANCE_ID.to_string()]);
        assert_eq!(exec.closed_scopes(), vec![INSTANCE_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_best_effort_continues_after_failed_grant() {
        let exec = RecordingExecutor::new();
        exec.fail_on("GRANT ALL ON DATABASE");
        manager(&exec, FailurePolicy::BestEffort)
            .create_role(&instance_id())
            .await
            .unwrap();

        assert!(exec.position("OWNER TO").is_some());
        assert_eq!(exec.scoped_statements(INSTANCE_ID).len(), 4);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let exec = RecordingExecutor::new();
        exec.fail_on("TO \"pgadmin\"");
        let err = manager(&exec, FailurePolicy::FailFast)
            .create_role(&instance_id())
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::StatementFailure { .. }));
        assert_eq!(exec.statements().len(), 2);
        assert!(exec.opened_scopes().is_empty());
    }

    #[tokio::test]
    async fn test_scoped_connection_closed_when_scoped_statement_fails() {
        let exec = RecordingExecutor::new();
        exec.fail_on("GRANT ALL ON SEQUENCES");
        let result = manager(&exec, FailurePolicy::FailFast)
            .create_role(&instance_id())
            .await;

        assert!(result.is_err());
        assert_eq!(exec.scoped_statements(INSTANCE_ID).len(), 3);
        assert_eq!(exec.closed_scopes(), vec![INSTANCE_ID.to_string()]);
        assert!(exec.position("OWNER TO").is_none());
    }

    #[tokio::test]
    async fn test_refused_scoped_connection_propagates() {
        let exec = RecordingExecutor::new();
        exec.refuse_scoped_connections();
        let err = manager(&exec, FailurePolicy::BestEffort)
            .create_role(&instance_id())
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Connection { .. }));
        assert!(exec.position("OWNER TO").is_none());
    }

    #[tokio::test]
    async fn test_binding_role_inherits_instance_role() {
        let exec = RecordingExecutor::new();
        let password = Password::from_stored("pw");
        manager(&exec, FailurePolicy::BestEffort)
            .create_binding_role(&instance_id(), &binding_id(), &password)
            .await
            .unwrap();

        let id = quoted(INSTANCE_ID);
        let binding = quoted(BINDING_ID);
        assert_eq!(
            exec.admin_statements(),
            vec![
                format!("CREATE ROLE {binding}"),
                format!("ALTER ROLE {binding} LOGIN PASSWORD 'pw'"),
                format!("GRANT {id} TO {binding}"),
                format!("ALTER ROLE {binding} INHERIT"),
                format!("GRANT ALL ON DATABASE {id} TO {binding}"),
            ]
        );
        assert_eq!(
            exec.scoped_statements(INSTANCE_ID),
            vec![format!(
                "GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO {binding}"
            )]
        );
        assert_eq!(exec.closed_scopes().len(), 1);
    }

    #[tokio::test]
    async fn test_role_exists_binds_name_as_parameter() {
        let exec = RecordingExecutor::new();
        let roles = manager(&exec, FailurePolicy::FailFast);
        assert!(!roles.role_exists(&binding_id()).await.unwrap());

        exec.respond("FROM pg_roles", vec![Row::new().with("rolname", BINDING_ID)]);
        assert!(roles.role_exists(&binding_id()).await.unwrap());

        let recorded = exec.recorded();
        assert_eq!(recorded[0].sql, sql::SELECT_ROLE);
        assert_eq!(recorded[0].params, vec![BINDING_ID]);
    }

    #[tokio::test]
    async fn test_revoke_binding_keeps_role() {
        let exec = RecordingExecutor::new();
        manager(&exec, FailurePolicy::BestEffort)
            .revoke_binding(&instance_id(), &binding_id())
            .await
            .unwrap();

        assert_eq!(
            exec.statements(),
            vec![
                format!("ALTER USER {} NOLOGIN", quoted(BINDING_ID)),
                format!("REVOKE {} FROM {}", quoted(INSTANCE_ID), quoted(BINDING_ID)),
            ]
        );
    }
}
