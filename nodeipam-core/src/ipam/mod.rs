//! Request and bookkeeping types understood by the node-local IPAM service.
//!
//! Field names follow the service's JSON contract, so these types can be
//! handed to its HTTP surface unchanged.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    net::{IpAddr, Ipv4Addr},
};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NetworkContainerType {
    /// pool of secondary IPs backing the node's pods
    #[default]
    Docker,
    /// dedicated container for a single multi-tenant pod
    Kubernetes,
}

impl Display for NetworkContainerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkContainerType::Docker => f.write_str("Docker"),
            NetworkContainerType::Kubernetes => f.write_str("Kubernetes"),
        }
    }
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct CreateNetworkContainerRequest {
    #[serde(rename = "NetworkContainerid")]
    pub network_container_id: String,
    #[serde(rename = "NetworkContainerType")]
    pub network_container_type: NetworkContainerType,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "IPConfiguration")]
    pub ip_configuration: IpConfiguration,
    #[serde(rename = "SecondaryIPConfigs", default)]
    pub secondary_ip_configs: BTreeMap<String, SecondaryIpConfig>,
    /// opaque to the agent, keys the allocation to a workload
    #[serde(rename = "OrchestratorContext")]
    pub orchestrator_context: Option<serde_json::Value>,
    #[serde(rename = "PrimaryInterfaceIdentifier")]
    pub primary_interface_identifier: Option<String>,
    #[serde(rename = "MultiTenancyInfo")]
    pub multi_tenancy_info: Option<MultiTenancyInfo>,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IpConfiguration {
    #[serde(rename = "IPSubnet")]
    pub ip_subnet: IpSubnet,
    #[serde(rename = "GatewayIPAddress")]
    pub gateway_ip_address: Option<IpAddr>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpSubnet {
    #[serde(rename = "IPAddress")]
    pub ip_address: IpAddr,
    #[serde(rename = "PrefixLength")]
    pub prefix_length: u8,
}

impl Default for IpSubnet {
    fn default() -> Self {
        Self {
            ip_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix_length: 0,
        }
    }
}

impl Display for IpSubnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ip_address, self.prefix_length)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecondaryIpConfig {
    #[serde(rename = "IPAddress")]
    pub ip_address: IpAddr,
    #[serde(rename = "NCVersion")]
    pub nc_version: i64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MultiTenancyInfo {
    #[serde(rename = "EncapType")]
    pub encap_type: String,
    #[serde(rename = "ID")]
    pub id: i64,
}

/// Workload currently holding an IP on this node.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PodInfo {
    #[serde(rename = "PodName")]
    pub name: String,
    #[serde(rename = "PodNamespace")]
    pub namespace: String,
}

impl PodInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl Display for PodInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Live IP (as a literal) to the pod holding it.
pub type PodInfoByIp = HashMap<String, PodInfo>;
