use std::fmt::Display;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[skip_serializing_none]
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "multitenancy.acn.azure.com",
    version = "v1alpha1",
    kind = "MultiTenantNetworkContainer",
    namespaced,
    status = "MultiTenantNetworkContainerStatus",
    derive = "Default",
    derive = "PartialEq"
)]
pub struct MultiTenantNetworkContainerSpec {
    /// network container id known to the IPAM service
    pub uuid: String,
    /// node the owning pod is scheduled on
    #[serde(default)]
    pub node: String,
    pub network: Option<String>,
    pub subnet: Option<String>,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiTenantNetworkContainerStatus {
    #[serde(default)]
    pub state: MultiTenantNetworkContainerState,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(rename = "ipSubnet", default)]
    pub ip_subnet: String,
    #[serde(default)]
    pub primary_interface_identifier: String,
    pub multi_tenant_info: Option<MultiTenantInfo>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiTenantInfo {
    pub encap_type: String,
    pub id: i64,
}

/// Progresses strictly forward, `Terminated` is final.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, JsonSchema,
)]
pub enum MultiTenantNetworkContainerState {
    #[default]
    Pending,
    Initialized,
    Succeeded,
    Terminated,
}

impl Display for MultiTenantNetworkContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Initialized => f.write_str("Initialized"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Terminated => f.write_str("Terminated"),
        }
    }
}

impl MultiTenantNetworkContainer {
    pub fn state(&self) -> MultiTenantNetworkContainerState {
        self.status
            .as_ref()
            .map(|status| status.state)
            .unwrap_or_default()
    }

    /// Case-insensitive, node names are DNS labels.
    pub fn is_scheduled_on(&self, node_name: &str) -> bool {
        self.spec.node.eq_ignore_ascii_case(node_name)
    }
}
