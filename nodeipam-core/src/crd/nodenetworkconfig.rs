use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Desired pool state published by this node.
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "acn.azure.com",
    version = "v1alpha",
    kind = "NodeNetworkConfig",
    shortname = "nnc",
    status = "NodeNetworkConfigStatus",
    derive = "Default",
    derive = "PartialEq"
)]
pub struct NodeNetworkConfigSpec {
    /// total number of IPs the node wants in its pool
    #[serde(rename = "requestedIPCount", default)]
    pub requested_ip_count: i64,
    /// secondary IP names (UUIDs) the node is willing to give back
    #[serde(rename = "ipsNotInUse", default)]
    pub ips_not_in_use: Vec<String>,
}

/// Control plane's answer: the network containers backing this node's pool.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeNetworkConfigStatus {
    #[serde(default)]
    pub scaler: Scaler,
    #[serde(default)]
    pub network_containers: Vec<NetworkContainer>,
}

/// Pool sizing parameters, forwarded untouched to the pool monitor.
#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scaler {
    #[serde(default)]
    pub batch_size: i64,
    #[serde(default)]
    pub release_threshold_percent: i64,
    #[serde(default)]
    pub request_threshold_percent: i64,
    #[serde(rename = "maxIPCount", default)]
    pub max_ip_count: i64,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContainer {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "primaryIP", default)]
    pub primary_ip: String,
    #[serde(default)]
    pub subnet_name: String,
    #[serde(rename = "ipAssignments", default)]
    pub ip_assignments: Vec<IpAssignment>,
    #[serde(default)]
    pub default_gateway: String,
    #[serde(default)]
    pub subnet_address_space: String,
    #[serde(default)]
    pub version: i64,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct IpAssignment {
    /// UUID naming this secondary IP
    pub name: String,
    pub ip: String,
}

impl NodeNetworkConfig {
    /// Network containers currently handed to this node, empty when the
    /// control plane has not filled in the status yet.
    pub fn network_containers(&self) -> &[NetworkContainer] {
        self.status
            .as_ref()
            .map(|status| status.network_containers.as_slice())
            .unwrap_or_default()
    }

    pub fn scaler(&self) -> Scaler {
        self.status
            .as_ref()
            .map(|status| status.scaler)
            .unwrap_or_default()
    }
}
