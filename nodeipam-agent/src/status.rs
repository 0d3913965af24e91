use async_trait::async_trait;
use kube::{api::PatchParams, Api, Client};
use nodeipam_core::{
    crd::multitenantnetworkcontainer::{
        MultiTenantNetworkContainer, MultiTenantNetworkContainerState,
    },
    kubernetes::operations::patch_resource_status,
};
use serde_json::json;

use crate::controller::AGENT_FIELD_MANAGER;

/// Writes the progress of a multi-tenant container back to the cluster.
#[async_trait]
pub trait MultiTenantStatusWriter: Send + Sync {
    async fn set_state(
        &self,
        name: &str,
        namespace: &str,
        state: MultiTenantNetworkContainerState,
    ) -> Result<(), kube::Error>;
}

pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MultiTenantStatusWriter for KubeStatusWriter {
    async fn set_state(
        &self,
        name: &str,
        namespace: &str,
        state: MultiTenantNetworkContainerState,
    ) -> Result<(), kube::Error> {
        let api: Api<MultiTenantNetworkContainer> = Api::namespaced(self.client.clone(), namespace);
        let patch_params = PatchParams {
            field_manager: Some(AGENT_FIELD_MANAGER.to_owned()),
            ..Default::default()
        };

        patch_resource_status(&api, name, &json!({ "state": state }), &patch_params).await?;

        Ok(())
    }
}
