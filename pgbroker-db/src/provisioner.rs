//! Instance lifecycle: database, role, and metadata together.

use std::sync::Arc;

use pgbroker_core::{
    BrokerResult, FailurePolicy, Identifier, InstanceId, Password, ProvisionRequest, RoleName,
    SqlExecutor,
};
use tracing::{error, info, warn};

use crate::repository::InstanceRepository;
use crate::roles::RoleManager;
use crate::sql;

/// Creates and destroys tenant instances.
///
/// No transaction wraps either sequence. A failure part way through leaves
/// the database or role partially configured; whether the sequence goes on
/// after a failed DDL step depends on the [`FailurePolicy`].
#[derive(Clone)]
pub struct InstanceProvisioner {
    executor: Arc<dyn SqlExecutor>,
    roles: RoleManager,
    repository: InstanceRepository,
    policy: FailurePolicy,
}

impl InstanceProvisioner {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        roles: RoleManager,
        repository: InstanceRepository,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            executor,
            roles,
            repository,
            policy,
        }
    }

    async fn run(&self, statement: String) -> BrokerResult<()> {
        self.executor.execute(&statement).await.under(self.policy)
    }

    /// Create the tenant database and role, then record the instance.
    ///
    /// Returns the generated login password of the instance role.
    ///
    /// Calling this twice for a live id under [`FailurePolicy::BestEffort`]
    /// re-passwords the existing role and inserts a second metadata row; the
    /// failed `CREATE DATABASE`/`CREATE ROLE` steps are only logged.
    /// [`InstanceRepository::find`] then warns about the duplicate.
    pub async fn create(&self, request: &ProvisionRequest) -> BrokerResult<Password> {
        let instance_id = &request.instance_id;
        info!(
            instance_id = %instance_id,
            service_id = %request.service_id,
            plan_id = %request.plan_id,
            "Provisioning instance"
        );

        self.run(sql::create_database(instance_id)).await?;
        self.run(sql::revoke_public(instance_id)).await?;

        let password = Password::generate();
        self.roles.create_role(instance_id).await?;
        self.roles.enable_login(instance_id, &password).await?;

        self.repository.insert(request, &password).await?;

        info!(instance_id = %instance_id, "Instance provisioned");
        Ok(password)
    }

    /// Drop the tenant database and its metadata. The instance role is left
    /// in place; see [`InstanceProvisioner::delete_role`].
    pub async fn delete(&self, instance_id: &InstanceId) -> BrokerResult<()> {
        info!(instance_id = %instance_id, "Deprovisioning instance");

        let owner = self.current_user().await?;
        if owner.is_none() {
            error!(
                instance_id = %instance_id,
                "Current user could not be found, skipping ownership reassignment"
            );
        }

        let terminated = self
            .executor
            .parameterized_query(sql::TERMINATE_BACKENDS, &[instance_id.as_str()])
            .await?;
        if !terminated.is_empty() {
            warn!(
                instance_id = %instance_id,
                sessions = terminated.len(),
                "Terminated open sessions"
            );
        }

        if let Some(owner) = owner {
            self.run(sql::alter_database_owner(instance_id, &owner))
                .await?;
        }
        self.run(sql::drop_database(instance_id)).await?;
        self.repository.delete(instance_id).await?;

        info!(instance_id = %instance_id, "Instance deprovisioned");
        Ok(())
    }

    /// `DROP ROLE IF EXISTS` on `role`. Safe to repeat.
    pub async fn delete_role(&self, role: &impl Identifier) -> BrokerResult<()> {
        self.roles.drop_role(role).await
    }

    /// Role the administrative connection runs as, or `None` when the query
    /// returned nothing usable.
    async fn current_user(&self) -> BrokerResult<Option<RoleName>> {
        let row = self.executor.query_one(sql::SELECT_CURRENT_USER).await?;
        let owner = row
            .get("current_user")
            .and_then(|name| RoleName::parse(name).ok());
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgbroker_core::{BrokerError, Row, PASSWORD_LEN};
    use pgbroker_test_utils::{instance_id, provision_request, RecordingExecutor, INSTANCE_ID};

    fn provisioner(exec: &RecordingExecutor, policy: FailurePolicy) -> InstanceProvisioner {
        let executor: Arc<dyn SqlExecutor> = Arc::new(exec.clone());
        InstanceProvisioner::new(
            executor.clone(),
            RoleManager::new(executor.clone(), RoleName::parse("pgadmin").unwrap(), policy),
            InstanceRepository::new(executor),
            policy,
        )
    }

    #[tokio::test]
    async fn test_create_sequence() {
        let exec = RecordingExecutor::new();
        let password = provisioner(&exec, FailurePolicy::BestEffort)
            .create(&provision_request())
            .await
            .unwrap();
        assert_eq!(password.expose().len(), PASSWORD_LEN);

        let admin = exec.admin_statements();
        assert!(admin[0].starts_with("CREATE DATABASE"));
        assert!(admin[1].starts_with("REVOKE ALL ON DATABASE"));
        assert!(admin[2].starts_with("CREATE ROLE"));

        let owner = exec.position("OWNER TO").unwrap();
        let login = exec.position("LOGIN PASSWORD").unwrap();
        let insert = exec.position("INSERT INTO service").unwrap();
        assert!(owner < login && login < insert);

        let recorded = exec.recorded();
        assert_eq!(recorded[insert].params[5], password.expose());
    }

    #[tokio::test]
    async fn test_create_best_effort_survives_duplicate_database() {
        let exec = RecordingExecutor::new();
        exec.fail_on("CREATE DATABASE");
        provisioner(&exec, FailurePolicy::BestEffort)
            .create(&provision_request())
            .await
            .unwrap();
        assert!(exec.position("INSERT INTO service").is_some());
    }

    #[tokio::test]
    async fn test_create_fail_fast_stops_before_role() {
        let exec = RecordingExecutor::new();
        exec.fail_on("CREATE DATABASE");
        let err = provisioner(&exec, FailurePolicy::FailFast)
            .create(&provision_request())
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::StatementFailure { .. }));
        assert_eq!(exec.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_create_propagates_insert_failure() {
        let exec = RecordingExecutor::new();
        exec.fail_on("INSERT INTO service");
        let result = provisioner(&exec, FailurePolicy::BestEffort)
            .create(&provision_request())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_sequence() {
        let exec = RecordingExecutor::new();
        exec.respond("current_user", vec![Row::new().with("current_user", "pgadmin")]);
        provisioner(&exec, FailurePolicy::BestEffort)
            .delete(&instance_id())
            .await
            .unwrap();

        let id = format!("\"{}\"", INSTANCE_ID);
        let statements = exec.statements();
        assert_eq!(statements[0], sql::SELECT_CURRENT_USER);
        assert_eq!(statements[1], sql::TERMINATE_BACKENDS);
        assert_eq!(statements[2], format!("ALTER DATABASE {id} OWNER TO \"pgadmin\""));
        assert_eq!(statements[3], format!("DROP DATABASE IF EXISTS {id}"));
        assert_eq!(statements[4], sql::DELETE_INSTANCE);
        assert_eq!(exec.recorded()[1].params, vec![INSTANCE_ID]);
        assert!(exec.position("DROP ROLE").is_none());
    }

    #[tokio::test]
    async fn test_delete_without_current_user_still_drops() {
        let exec = RecordingExecutor::new();
        provisioner(&exec, FailurePolicy::FailFast)
            .delete(&instance_id())
            .await
            .unwrap();

        assert!(exec.position("OWNER TO").is_none());
        assert!(exec.position("DROP DATABASE IF EXISTS").is_some());
        assert!(exec.position("DELETE FROM service").is_some());
    }

    #[tokio::test]
    async fn test_delete_quotes_unusual_current_user() {
        let exec = RecordingExecutor::new();
        exec.respond(
            "current_user",
            vec![Row::new().with("current_user", "ad\"min")],
        );
        provisioner(&exec, FailurePolicy::BestEffort)
            .delete(&instance_id())
            .await
            .unwrap();

        let owner = exec.position("OWNER TO").unwrap();
        assert!(exec.statements()[owner].ends_with("OWNER TO \"ad\"\"min\""));
    }

    #[tokio::test]
    async fn test_delete_role_is_idempotent_statement() {
        let exec = RecordingExecutor::new();
        let provisioner = provisioner(&exec, FailurePolicy::FailFast);
        provisioner.delete_role(&instance_id()).await.unwrap();
        provisioner.delete_role(&instance_id()).await.unwrap();

        let statements = exec.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements
            .iter()
            .all(|s| s == &format!("DROP ROLE IF EXISTS \"{}\"", INSTANCE_ID)));
    }
}
