//! Broker facade.
//!
//! Entry point for callers holding raw identifier strings. Every method
//! validates its identifiers before touching any component, so an invalid id
//! returns [`BrokerError::InvalidIdentifier`] with no statement issued.

use std::sync::Arc;

use pgbroker_core::{
    BindingId, BrokerError, BrokerResult, InstanceId, ProvisionRequest, ServiceInstance,
    SqlExecutor,
};
use secrecy::SecretString;
use tracing::info;

use crate::binding::BindingManager;
use crate::config::BrokerConfig;
use crate::db::PgExecutor;
use crate::provisioner::InstanceProvisioner;
use crate::repository::InstanceRepository;
use crate::roles::RoleManager;

/// Configured lifecycle components behind one handle.
#[derive(Clone)]
pub struct Broker {
    repository: InstanceRepository,
    provisioner: InstanceProvisioner,
    bindings: BindingManager,
}

impl Broker {
    /// Wire every component to `executor`. Does not touch the database.
    pub fn with_executor(executor: Arc<dyn SqlExecutor>, config: &BrokerConfig) -> Self {
        let repository = InstanceRepository::new(executor.clone());
        let roles = RoleManager::new(
            executor.clone(),
            config.admin_role.clone(),
            config.failure_policy,
        );
        let provisioner = InstanceProvisioner::new(
            executor,
            roles.clone(),
            repository.clone(),
            config.failure_policy,
        );
        let bindings = BindingManager::new(
            repository.clone(),
            roles,
            config.admin_url.clone(),
            config.binding_identity,
        );

        Self {
            repository,
            provisioner,
            bindings,
        }
    }

    /// Connect to the administrative database and make sure the metadata
    /// table exists.
    pub async fn connect(config: &BrokerConfig) -> BrokerResult<Self> {
        let executor = PgExecutor::from_config(config)?;
        let broker = Self::with_executor(Arc::new(executor), config);
        broker.repository.ensure_schema().await?;

        info!(
            host = %config.admin_url.host(),
            port = config.admin_url.port(),
            admin_role = %config.admin_role,
            binding_identity = %config.binding_identity,
            failure_policy = %config.failure_policy,
            "Broker connected"
        );
        Ok(broker)
    }

    /// Provision a tenant database and role and record the instance.
    pub async fn create_instance(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
        organization_guid: &str,
        space_guid: &str,
    ) -> BrokerResult<ServiceInstance> {
        let request = ProvisionRequest::new(
            InstanceId::parse(instance_id)?,
            service_id,
            plan_id,
            organization_guid,
            space_guid,
        );
        let password = self.provisioner.create(&request).await?;

        Ok(ServiceInstance {
            instance_id: request.instance_id.to_string(),
            service_definition_id: request.service_id,
            plan_id: request.plan_id,
            organization_guid: request.organization_guid,
            space_guid: request.space_guid,
            credentials: password.expose().to_string(),
        })
    }

    pub async fn delete_instance(&self, instance_id: &str) -> BrokerResult<()> {
        let instance_id = InstanceId::parse(instance_id)?;
        self.provisioner.delete(&instance_id).await
    }

    /// Drop the role named `role_id`. Missing roles are not an error.
    pub async fn delete_role(&self, role_id: &str) -> BrokerResult<()> {
        let role_id = BindingId::parse(role_id)?;
        self.provisioner.delete_role(&role_id).await
    }

    pub async fn bind(&self, instance_id: &str, binding_id: &str) -> BrokerResult<SecretString> {
        let instance_id = InstanceId::parse(instance_id)?;
        let binding_id = BindingId::parse(binding_id)?;
        self.bindings.bind(&instance_id, &binding_id).await
    }

    pub async fn unbind(&self, instance_id: &str, binding_id: &str) -> BrokerResult<()> {
        let instance_id = InstanceId::parse(instance_id)?;
        let binding_id = BindingId::parse(binding_id)?;
        self.bindings.unbind(&instance_id, &binding_id).await
    }

    /// Stored record for `instance_id`; blank when the instance is unknown.
    pub async fn find_instance(&self, instance_id: &str) -> BrokerResult<ServiceInstance> {
        let instance_id = InstanceId::parse(instance_id)?;
        self.repository.find(&instance_id).await
    }

    /// Like [`Broker::find_instance`], but an unknown instance is
    /// [`BrokerError::NotFound`].
    pub async fn get_instance(&self, instance_id: &str) -> BrokerResult<ServiceInstance> {
        let instance = self.find_instance(instance_id).await?;
        if instance.is_blank() {
            return Err(BrokerError::NotFound {
                instance_id: instance_id.to_string(),
            });
        }
        Ok(instance)
    }

    pub async fn list_instances(&self) -> BrokerResult<Vec<ServiceInstance>> {
        self.repository.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdminUrl;
    use pgbroker_core::Row;
    use pgbroker_test_utils::{RecordingExecutor, INSTANCE_ID};

    fn broker(exec: &RecordingExecutor) -> Broker {
        let admin_url =
            AdminUrl::parse("postgres://localhost:5432/postgres?user=pgadmin&password=pw").unwrap();
        let config = BrokerConfig::new(admin_url).unwrap();
        Broker::with_executor(Arc::new(exec.clone()), &config)
    }

    #[tokio::test]
    async fn test_create_returns_stored_shape() {
        let exec = RecordingExecutor::new();
        let instance = broker(&exec)
            .create_instance(INSTANCE_ID, "svc-id", "plan-id", "org-guid", "space-guid")
            .await
            .unwrap();

        assert_eq!(instance.instance_id, INSTANCE_ID);
        assert_eq!(instance.plan_id, "plan-id");
        assert!(!instance.credentials.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_id_issues_nothing() {
        let exec = RecordingExecutor::new();
        let broker = broker(&exec);

        let err = broker
            .create_instance("not-a-uuid", "s", "p", "o", "sp")
            .await
            .unwrap_err();
        assert!(err.is_invalid_identifier());
        assert!(broker.delete_instance("x\"; DROP ROLE postgres").await.is_err());
        assert!(broker.bind(INSTANCE_ID, "").await.is_err());
        assert!(broker.unbind("", INSTANCE_ID).await.is_err());
        assert!(broker.delete_role("pgadmin").await.is_err());

        assert!(exec.statements().is_empty());
    }

    #[tokio::test]
    async fn test_get_instance_not_found() {
        let exec = RecordingExecutor::new();
        let broker = broker(&exec);

        assert!(broker.find_instance(INSTANCE_ID).await.unwrap().is_blank());
        let err = broker.get_instance(INSTANCE_ID).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_instance_found() {
        let exec = RecordingExecutor::new();
        exec.respond(
            "FROM service WHERE",
            vec![Row::new()
                .with("serviceinstanceid", INSTANCE_ID)
                .with("creds", "pw")],
        );
        let instance = broker(&exec).get_instance(INSTANCE_ID).await.unwrap();
        assert_eq!(instance.credentials, "pw");
    }
}
