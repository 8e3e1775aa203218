//! Instance metadata persistence.

use std::sync::Arc;

use pgbroker_core::{
    BrokerResult, Identifier, InstanceId, Password, ProvisionRequest, Row, ServiceInstance,
    SqlExecutor,
};
use tracing::{debug, info, warn};

use crate::sql;

/// Reads and writes the `service` metadata table on the administrative
/// connection.
#[derive(Clone)]
pub struct InstanceRepository {
    executor: Arc<dyn SqlExecutor>,
}

impl InstanceRepository {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Create the metadata table if it does not exist.
    pub async fn ensure_schema(&self) -> BrokerResult<()> {
        self.executor
            .try_execute(&sql::create_metadata_table())
            .await?;
        debug!("Metadata table ready");
        Ok(())
    }

    pub async fn insert(&self, request: &ProvisionRequest, password: &Password) -> BrokerResult<()> {
        self.executor
            .parameterized_update(
                sql::INSERT_INSTANCE,
                &[
                    request.instance_id.as_str(),
                    request.service_id.as_str(),
                    request.plan_id.as_str(),
                    request.organization_guid.as_str(),
                    request.space_guid.as_str(),
                    password.expose(),
                ],
            )
            .await?;
        info!(instance_id = %request.instance_id, "Stored instance metadata");
        Ok(())
    }

    /// Look up an instance. An unknown id yields a blank record; see
    /// [`ServiceInstance::is_blank`].
    ///
    /// The table has no key, so a repeated create leaves several rows for one
    /// id. The first row the server returns wins and a warning is logged.
    pub async fn find(&self, instance_id: &InstanceId) -> BrokerResult<ServiceInstance> {
        let rows = self
            .executor
            .parameterized_query(sql::SELECT_INSTANCE, &[instance_id.as_str()])
            .await?;
        if rows.len() > 1 {
            warn!(
                instance_id = %instance_id,
                rows = rows.len(),
                "Duplicate metadata rows; stored credentials may be stale"
            );
        }
        Ok(rows.first().map(instance_from_row).unwrap_or_default())
    }

    /// Every stored instance, ordered by id.
    pub async fn list(&self) -> BrokerResult<Vec<ServiceInstance>> {
        let rows = self
            .executor
            .parameterized_query(sql::SELECT_ALL_INSTANCES, &[])
            .await?;
        Ok(rows.iter().map(instance_from_row).collect())
    }

    pub async fn delete(&self, instance_id: &InstanceId) -> BrokerResult<u64> {
        let deleted = self
            .executor
            .parameterized_update(sql::DELETE_INSTANCE, &[instance_id.as_str()])
            .await?;
        info!(instance_id = %instance_id, deleted, "Removed instance metadata");
        Ok(deleted)
    }
}

fn instance_from_row(row: &Row) -> ServiceInstance {
    ServiceInstance {
        instance_id: row.get_or_blank("serviceinstanceid"),
        service_definition_id: row.get_or_blank("servicedefinitionid"),
        plan_id: row.get_or_blank("planid"),
        organization_guid: row.get_or_blank("organizationguid"),
        space_guid: row.get_or_blank("spaceguid"),
        credentials: row.get_or_blank("creds"),
    }
}
