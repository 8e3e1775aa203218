//! Service instance metadata.

use serde::{Deserialize, Serialize};

use crate::identity::InstanceId;

/// One provisioned tenant, as stored in the metadata table.
///
/// Every field is a plain string because a lookup for an unknown id yields a
/// record built from an empty row. Check [`ServiceInstance::is_blank`] before
/// trusting the contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub service_definition_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    /// Login password of the instance role, stored in clear text.
    pub credentials: String,
}

impl ServiceInstance {
    /// True when the record came from a missing row.
    pub fn is_blank(&self) -> bool {
        self.instance_id.is_empty()
            && self.service_definition_id.is_empty()
            && self.plan_id.is_empty()
            && self.organization_guid.is_empty()
            && self.space_guid.is_empty()
            && self.credentials.is_empty()
    }
}

/// Inputs to instance creation, as received from the platform.
///
/// Only `instance_id` is validated; the catalog and org/space attributes are
/// informational and stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub instance_id: InstanceId,
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
}

impl ProvisionRequest {
    pub fn new(
        instance_id: InstanceId,
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        organization_guid: impl Into<String>,
        space_guid: impl Into<String>,
    ) -> Self {
        Self {
            instance_id,
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            organization_guid: organization_guid.into(),
            space_guid: space_guid.into(),
        }
    }
}
