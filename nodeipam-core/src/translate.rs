//! Pure conversion from declarative cluster state into IPAM requests.
//!
//! Nothing here performs I/O, so every function is safe to call from any
//! task and is exercised without mocks.

use std::{collections::BTreeMap, net::IpAddr};

use ipnet::IpNet;
use log::trace;
use thiserror::Error;

use crate::{
    crd::{
        multitenantnetworkcontainer::MultiTenantNetworkContainer,
        nodenetworkconfig::{NetworkContainer, NodeNetworkConfigStatus},
    },
    ipam::{
        CreateNetworkContainerRequest, IpConfiguration, IpSubnet, MultiTenancyInfo,
        NetworkContainerType, PodInfo, SecondaryIpConfig,
    },
};

/// Version reported for multi-tenant containers, which are never updated in place.
pub const MULTITENANT_NC_VERSION: &str = "0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("More NCs than supported (expected 1, got {})!", .0)]
    UnsupportedNetworkContainerCount(usize),
    #[error("Invalid PrimaryIP '{}'!", .0)]
    InvalidPrimaryIp(String),
    #[error("Invalid SubnetAddressSpace '{}'!", .0)]
    InvalidSubnetAddressSpace(String),
    #[error("Invalid DefaultGateway '{}'!", .0)]
    InvalidDefaultGateway(String),
    #[error("Invalid version '{}'!", .0)]
    InvalidVersion(String),
    #[error("Invalid SecondaryIP '{ip}' assigned to '{name}'!")]
    InvalidSecondaryIp { name: String, ip: String },
    #[error("Multi-tenant network container has no status yet!")]
    MissingStatus,
    #[error("Multi-tenant network container is missing metadata!")]
    MissingMetadata,
    #[error("Invalid Gateway '{}'!", .0)]
    InvalidGateway(String),
    #[error("Couldn't encode the orchestrator context! Reason: {}", .0)]
    OrchestratorContext(String),
    #[error("Invalid IP '{}'!", .0)]
    InvalidIp(String),
    #[error("Invalid IPSubnet '{}'!", .0)]
    InvalidIpSubnet(String),
}

/// Translates a `NodeNetworkConfig` status into the request priming the
/// IPAM service. Exactly one network container is supported, an empty list
/// yields an empty request.
pub fn create_nc_request_from_status(
    status: &NodeNetworkConfigStatus,
) -> Result<CreateNetworkContainerRequest, TranslationError> {
    match status.network_containers.as_slice() {
        [] => Ok(CreateNetworkContainerRequest::default()),
        [nc] => create_nc_request(nc),
        ncs => Err(TranslationError::UnsupportedNetworkContainerCount(ncs.len())),
    }
}

fn create_nc_request(
    nc: &NetworkContainer,
) -> Result<CreateNetworkContainerRequest, TranslationError> {
    trace!("Translating network container '{}' (version {})", nc.id, nc.version);

    let primary_ip = parse_ip(&nc.primary_ip)
        .ok_or_else(|| TranslationError::InvalidPrimaryIp(nc.primary_ip.clone()))?;
    let subnet = parse_cidr(&nc.subnet_address_space).ok_or_else(|| {
        TranslationError::InvalidSubnetAddressSpace(nc.subnet_address_space.clone())
    })?;
    let gateway = parse_optional_ip(&nc.default_gateway)
        .map_err(|_| TranslationError::InvalidDefaultGateway(nc.default_gateway.clone()))?;

    let version = nc.version.to_string();
    let nc_version = version
        .parse::<i64>()
        .map_err(|_| TranslationError::InvalidVersion(version.clone()))?;

    let secondary_ip_configs = nc
        .ip_assignments
        .iter()
        .map(|assignment| {
            let ip_address =
                parse_ip(&assignment.ip).ok_or_else(|| TranslationError::InvalidSecondaryIp {
                    name: assignment.name.clone(),
                    ip: assignment.ip.clone(),
                })?;

            Ok((
                assignment.name.clone(),
                SecondaryIpConfig {
                    ip_address,
                    nc_version,
                },
            ))
        })
        .collect::<Result<BTreeMap<_, _>, TranslationError>>()?;

    Ok(CreateNetworkContainerRequest {
        network_container_id: nc.id.clone(),
        network_container_type: NetworkContainerType::Docker,
        version,
        ip_configuration: IpConfiguration {
            ip_subnet: IpSubnet {
                ip_address: primary_ip,
                prefix_length: subnet.prefix_len(),
            },
            gateway_ip_address: gateway,
        },
        secondary_ip_configs,
        ..Default::default()
    })
}

/// Builds the request provisioning a single multi-tenant pod's container
/// from the status the orchestrator filled in.
pub fn create_nc_request_from_multitenant(
    container: &MultiTenantNetworkContainer,
) -> Result<CreateNetworkContainerRequest, TranslationError> {
    let status = container
        .status
        .as_ref()
        .ok_or(TranslationError::MissingStatus)?;
    let name = container
        .metadata
        .name
        .as_deref()
        .ok_or(TranslationError::MissingMetadata)?;
    let namespace = container.metadata.namespace.as_deref().unwrap_or_default();

    let subnet = parse_cidr(&status.ip_subnet)
        .ok_or_else(|| TranslationError::InvalidIpSubnet(status.ip_subnet.clone()))?;
    let ip_address =
        parse_ip(&status.ip).ok_or_else(|| TranslationError::InvalidIp(status.ip.clone()))?;
    let gateway = parse_optional_ip(&status.gateway)
        .map_err(|_| TranslationError::InvalidGateway(status.gateway.clone()))?;

    let orchestrator_context = serde_json::to_value(PodInfo::new(name, namespace))
        .map_err(|error| TranslationError::OrchestratorContext(error.to_string()))?;

    Ok(CreateNetworkContainerRequest {
        network_container_id: container.spec.uuid.clone(),
        network_container_type: NetworkContainerType::Kubernetes,
        version: MULTITENANT_NC_VERSION.to_owned(),
        ip_configuration: IpConfiguration {
            ip_subnet: IpSubnet {
                ip_address,
                prefix_length: subnet.prefix_len(),
            },
            gateway_ip_address: gateway,
        },
        secondary_ip_configs: BTreeMap::new(),
        orchestrator_context: Some(orchestrator_context),
        primary_interface_identifier: Some(status.primary_interface_identifier.clone())
            .filter(|identifier| !identifier.is_empty()),
        multi_tenancy_info: status.multi_tenant_info.as_ref().map(|info| MultiTenancyInfo {
            encap_type: info.encap_type.clone(),
            id: info.id,
        }),
    })
}

/// Accepts plain literals only, `10.0.0.1/24` is rejected.
fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.parse().ok()
}

fn parse_optional_ip(raw: &str) -> Result<Option<IpAddr>, ()> {
    match raw {
        "" => Ok(None),
        raw => parse_ip(raw).map(Some).ok_or(()),
    }
}

fn parse_cidr(raw: &str) -> Option<IpNet> {
    raw.parse().ok()
}
