//! In-process IPAM store.
//!
//! Holds the network containers pushed by the reconcilers and the state of
//! every secondary IP in the node's pool. Pods are handed the lowest free
//! address; IPs the node announced as not in use are never handed out.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::{debug, info, warn};
use nodeipam_core::{
    crd::nodenetworkconfig::{NodeNetworkConfigSpec, Scaler},
    ipam::{CreateNetworkContainerRequest, NetworkContainerType, PodInfo, PodInfoByIp},
};
use thiserror::Error;

use super::{GetNetworkContainerResponse, IpamService, Response, ResponseCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpState {
    Available,
    Assigned(PodInfo),
    /// announced as not in use, waiting for the control plane to take it back
    PendingRelease,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolIp {
    pub network_container_id: String,
    pub ip: IpAddr,
    pub nc_version: i64,
    pub state: IpState,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("The IP pool for this node was exhausted!")]
    PoolExhausted,
}

#[derive(Debug, Default)]
struct IpamState {
    containers: HashMap<String, CreateNetworkContainerRequest>,
    /// secondary IP name (UUID) to its state
    pool: HashMap<String, PoolIp>,
    scaler: Scaler,
    spec: NodeNetworkConfigSpec,
}

#[derive(Debug, Default)]
pub struct LocalIpam(RwLock<IpamState>);

impl LocalIpam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `pod` an address, returning the one it already holds if any.
    pub fn request_ip_for_pod(&self, pod: &PodInfo) -> Result<IpAddr, PoolError> {
        let mut state = self.write();

        let assigned = IpState::Assigned(pod.clone());
        if let Some(existing) = state.pool.values().find(|ip| ip.state == assigned) {
            return Ok(existing.ip);
        }

        let candidate = state
            .pool
            .iter_mut()
            .filter(|(_, ip)| ip.state == IpState::Available)
            .min_by_key(|(_, ip)| ip.ip)
            .ok_or(PoolError::PoolExhausted)?;

        candidate.1.state = IpState::Assigned(pod.clone());

        info!("Assigned {} ({}) to {pod}", candidate.1.ip, candidate.0);

        Ok(candidate.1.ip)
    }

    /// Frees the address held by `pod`, if any.
    pub fn release_ip_for_pod(&self, pod: &PodInfo) -> Option<IpAddr> {
        let mut state = self.write();
        let IpamState { pool, spec, .. } = &mut *state;

        let (name, ip) = pool
            .iter_mut()
            .find(|(_, ip)| ip.state == IpState::Assigned(pod.clone()))?;

        ip.state = if spec.ips_not_in_use.contains(name) {
            IpState::PendingRelease
        } else {
            IpState::Available
        };

        info!("Released {} held by {pod}", ip.ip);

        Some(ip.ip)
    }

    pub fn pool_ip(&self, name: &str) -> Option<PoolIp> {
        self.read().pool.get(name).cloned()
    }

    pub fn assigned_count(&self) -> usize {
        self.read()
            .pool
            .values()
            .filter(|ip| matches!(ip.state, IpState::Assigned(_)))
            .count()
    }

    pub fn pool_monitor_settings(&self) -> (Scaler, NodeNetworkConfigSpec) {
        let state = self.read();

        (state.scaler, state.spec.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, IpamState> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IpamState> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IpamState {
    fn upsert_nc(&mut self, request: &CreateNetworkContainerRequest) -> Response {
        if request.network_container_id.is_empty() {
            return Response::failure(
                ResponseCode::InvalidParameter,
                "network container id is empty",
            );
        }

        if request.version.parse::<i64>().is_err() {
            return Response::failure(
                ResponseCode::InvalidParameter,
                format!("version '{}' is not an integer", request.version),
            );
        }

        if request.network_container_type == NetworkContainerType::Docker {
            if let Err(response) = self.sync_pool(request) {
                return response;
            }
        }

        debug!(
            "Stored {} network container '{}' (version {})",
            request.network_container_type, request.network_container_id, request.version
        );

        self.containers
            .insert(request.network_container_id.clone(), request.clone());

        Response::success()
    }

    /// Brings the pool in line with the secondary IPs of `request`. Nothing
    /// is changed unless every pod-held IP survives the update.
    fn sync_pool(&mut self, request: &CreateNetworkContainerRequest) -> Result<(), Response> {
        let id = &request.network_container_id;

        for (name, pool_ip) in self.pool.iter().filter(|(_, ip)| &ip.network_container_id == id) {
            let IpState::Assigned(pod) = &pool_ip.state else {
                continue;
            };

            match request.secondary_ip_configs.get(name) {
                Some(config) if config.ip_address == pool_ip.ip => {}
                _ => {
                    return Err(Response::failure(
                        ResponseCode::InconsistentIpConfigState,
                        format!("{} ({name}) is still held by {pod}", pool_ip.ip),
                    ))
                }
            }
        }

        self.pool.retain(|name, ip| {
            &ip.network_container_id != id || request.secondary_ip_configs.contains_key(name)
        });

        for (name, config) in &request.secondary_ip_configs {
            let pool_ip = self.pool.entry(name.clone()).or_insert_with(|| PoolIp {
                network_container_id: id.clone(),
                ip: config.ip_address,
                nc_version: config.nc_version,
                state: IpState::Available,
            });

            pool_ip.ip = config.ip_address;
            pool_ip.nc_version = config.nc_version;
        }

        Ok(())
    }

    fn apply_pool_monitor(&mut self, scaler: &Scaler, spec: &NodeNetworkConfigSpec) {
        self.scaler = *scaler;
        self.spec = spec.clone();

        for (name, ip) in self.pool.iter_mut() {
            let not_in_use = spec.ips_not_in_use.contains(name);

            let next = match &ip.state {
                IpState::Available if not_in_use => Some(IpState::PendingRelease),
                IpState::PendingRelease if !not_in_use => Some(IpState::Available),
                IpState::Assigned(pod) if not_in_use => {
                    warn!("{} ({name}) is marked as not in use but held by {pod}!", ip.ip);
                    None
                }
                _ => None,
            };

            if let Some(next) = next {
                ip.state = next;
            }
        }
    }

    fn bind_pods(&mut self, bindings: Vec<(String, PodInfo)>) {
        for (name, pod) in bindings {
            if let Some(ip) = self.pool.get_mut(&name) {
                ip.state = IpState::Assigned(pod);
            }
        }
    }
}

/// Maps every bound address to its secondary IP config name. Fails without
/// side effects if any address is outside the container.
fn resolve_bindings(
    request: &CreateNetworkContainerRequest,
    pod_info_by_ip: &PodInfoByIp,
) -> Result<Vec<(String, PodInfo)>, Response> {
    let mut bindings = Vec::with_capacity(pod_info_by_ip.len());

    for (raw_ip, pod) in pod_info_by_ip {
        let name = raw_ip
            .parse::<IpAddr>()
            .ok()
            .and_then(|ip| {
                request
                    .secondary_ip_configs
                    .iter()
                    .find(|(_, config)| config.ip_address == ip)
            })
            .map(|(name, _)| name.clone())
            .ok_or_else(|| {
                Response::failure(
                    ResponseCode::InconsistentIpConfigState,
                    format!(
                        "{pod} holds {raw_ip} which is not part of network container '{}'",
                        request.network_container_id
                    ),
                )
            })?;

        bindings.push((name, pod.clone()));
    }

    Ok(bindings)
}

impl IpamService for LocalIpam {
    fn reconcile_nc_state(
        &self,
        request: Option<&CreateNetworkContainerRequest>,
        pod_info_by_ip: Option<&PodInfoByIp>,
        scaler: &Scaler,
        spec: &NodeNetworkConfigSpec,
    ) -> Response {
        let mut state = self.write();

        if let Some(request) = request {
            let bindings = match pod_info_by_ip {
                Some(pod_info_by_ip) => match resolve_bindings(request, pod_info_by_ip) {
                    Ok(bindings) => bindings,
                    Err(response) => return response,
                },
                None => Vec::new(),
            };

            let response = state.upsert_nc(request);
            if response.code != ResponseCode::Success {
                return response;
            }

            state.bind_pods(bindings);

            info!(
                "Restored network container '{}' with {} pod bindings",
                request.network_container_id,
                pod_info_by_ip.map(|pods| pods.len()).unwrap_or_default()
            );
        }

        state.apply_pool_monitor(scaler, spec);

        Response::success()
    }

    fn create_or_update_nc(&self, request: &CreateNetworkContainerRequest) -> Response {
        self.write().upsert_nc(request)
    }

    fn update_pool_monitor(&self, scaler: &Scaler, spec: &NodeNetworkConfigSpec) {
        self.write().apply_pool_monitor(scaler, spec)
    }

    fn get_nc(&self, network_container_id: &str) -> GetNetworkContainerResponse {
        match self.read().containers.get(network_container_id) {
            Some(container) => GetNetworkContainerResponse {
                response: Response::success(),
                network_container: Some(container.clone()),
            },
            None => GetNetworkContainerResponse {
                response: Response::failure(
                    ResponseCode::UnknownContainerId,
                    format!("network container '{network_container_id}' doesn't exist"),
                ),
                network_container: None,
            },
        }
    }

    fn delete_nc(&self, network_container_id: &str) -> Response {
        let mut state = self.write();

        if state.containers.remove(network_container_id).is_some() {
            state
                .pool
                .retain(|_, ip| ip.network_container_id != network_container_id);

            info!("Removed network container '{network_container_id}'");
        }

        Response::success()
    }
}
