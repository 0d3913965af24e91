//! Reader for the CNI plugin's on-disk endpoint state.
//!
//! The plugin persists every endpoint it set up, keyed by interface and
//! network. Only the pod identity and the assigned addresses are of interest
//! here.

use std::collections::HashMap;

use log::warn;
use serde::Deserialize;
use thiserror::Error;

use crate::ipam::{PodInfo, PodInfoByIp};

pub const DEFAULT_CNI_STATE_PATH: &str = "/var/run/azure-vnet.json";

#[derive(Debug, Error)]
pub enum CniStateError {
    #[error("Couldn't parse the CNI state file! Reason: {}", .0)]
    Malformed(#[from] serde_json::Error),
    #[error("Address {} is claimed by both {} and {}!", .ip, .first, .second)]
    DuplicateAddress {
        ip: String,
        first: PodInfo,
        second: PodInfo,
    },
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct CniState {
    #[serde(default)]
    network: Option<NetworkManagerState>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct NetworkManagerState {
    #[serde(default)]
    external_interfaces: HashMap<String, ExternalInterface>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct ExternalInterface {
    #[serde(default)]
    networks: HashMap<String, Network>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct Network {
    #[serde(default)]
    endpoints: HashMap<String, Endpoint>,
}

#[derive(Deserialize, Debug, Default)]
struct Endpoint {
    #[serde(rename = "IPAddresses", default)]
    ip_addresses: Vec<EndpointAddress>,
    #[serde(rename = "PODName", default)]
    pod_name: String,
    #[serde(rename = "PODNameSpace", default)]
    pod_namespace: String,
}

#[derive(Deserialize, Debug)]
struct EndpointAddress {
    #[serde(rename = "IP")]
    ip: String,
}

/// Parses the raw state file into live IP to pod bindings. Endpoints not
/// attached to a pod are skipped.
pub fn parse_pod_info_by_ip(raw: &str) -> Result<PodInfoByIp, CniStateError> {
    if raw.trim().is_empty() {
        return Ok(PodInfoByIp::new());
    }

    let state: CniState = serde_json::from_str(raw)?;
    let mut pod_info_by_ip = PodInfoByIp::new();

    let endpoints = state
        .network
        .unwrap_or_default()
        .external_interfaces
        .into_values()
        .flat_map(|interface| interface.networks.into_values())
        .flat_map(|network| network.endpoints.into_values());

    for endpoint in endpoints {
        if endpoint.pod_name.is_empty() {
            continue;
        }

        let pod_info = PodInfo::new(endpoint.pod_name, endpoint.pod_namespace);

        for address in endpoint.ip_addresses {
            if let Some(existing) = pod_info_by_ip.get(&address.ip) {
                if existing == &pod_info {
                    continue;
                }

                return Err(CniStateError::DuplicateAddress {
                    ip: address.ip,
                    first: existing.clone(),
                    second: pod_info,
                });
            }

            if address.ip.parse::<std::net::IpAddr>().is_err() {
                warn!("Skipping unparsable endpoint address '{}' of {pod_info}", address.ip);
                continue;
            }

            pod_info_by_ip.insert(address.ip, pod_info.clone());
        }
    }

    Ok(pod_info_by_ip)
}
