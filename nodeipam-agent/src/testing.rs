//! Hand-rolled fakes for the seams the agent talks through.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use nodeipam_core::{
    crd::{
        multitenantnetworkcontainer::MultiTenantNetworkContainerState,
        nodenetworkconfig::{NodeNetworkConfig, NodeNetworkConfigSpec, Scaler},
    },
    ipam::{CreateNetworkContainerRequest, PodInfoByIp},
};

use crate::{
    backoff::Backoff,
    cluster::{ClusterClientError, DirectClient},
    ipam::{GetNetworkContainerResponse, IpamClient, IpamService, Response, ResponseCode},
    metrics::Metrics,
    reconciler::context::ReconcilerContext,
    status::MultiTenantStatusWriter,
};

#[derive(Debug, Clone, PartialEq)]
pub enum IpamCall {
    ReconcileNcState {
        request: Option<CreateNetworkContainerRequest>,
        pod_info_by_ip: Option<PodInfoByIp>,
        scaler: Scaler,
        spec: NodeNetworkConfigSpec,
    },
    CreateOrUpdateNc(CreateNetworkContainerRequest),
    UpdatePoolMonitor {
        scaler: Scaler,
        spec: NodeNetworkConfigSpec,
    },
    GetNc(String),
    DeleteNc(String),
}

/// Records every call. Known containers are kept so `get_nc` behaves like
/// the real service; `fail_with` makes every call return the given response.
#[derive(Debug, Default)]
pub struct FakeIpamService {
    calls: Mutex<Vec<IpamCall>>,
    failure: Mutex<Option<Response>>,
    containers: Mutex<HashMap<String, CreateNetworkContainerRequest>>,
}

impl FakeIpamService {
    pub fn calls(&self) -> Vec<IpamCall> {
        lock(&self.calls).clone()
    }

    pub fn fail_with(&self, response: Response) {
        *lock(&self.failure) = Some(response);
    }

    pub fn insert_nc(&self, request: CreateNetworkContainerRequest) {
        lock(&self.containers).insert(request.network_container_id.clone(), request);
    }

    fn record(&self, call: IpamCall) -> Option<Response> {
        lock(&self.calls).push(call);
        lock(&self.failure).clone()
    }
}

impl IpamService for FakeIpamService {
    fn reconcile_nc_state(
        &self,
        request: Option<&CreateNetworkContainerRequest>,
        pod_info_by_ip: Option<&PodInfoByIp>,
        scaler: &Scaler,
        spec: &NodeNetworkConfigSpec,
    ) -> Response {
        self.record(IpamCall::ReconcileNcState {
            request: request.cloned(),
            pod_info_by_ip: pod_info_by_ip.cloned(),
            scaler: *scaler,
            spec: spec.clone(),
        })
        .unwrap_or_else(Response::success)
    }

    fn create_or_update_nc(&self, request: &CreateNetworkContainerRequest) -> Response {
        if let Some(failure) = self.record(IpamCall::CreateOrUpdateNc(request.clone())) {
            return failure;
        }

        self.insert_nc(request.clone());

        Response::success()
    }

    fn update_pool_monitor(&self, scaler: &Scaler, spec: &NodeNetworkConfigSpec) {
        self.record(IpamCall::UpdatePoolMonitor {
            scaler: *scaler,
            spec: spec.clone(),
        });
    }

    fn get_nc(&self, network_container_id: &str) -> GetNetworkContainerResponse {
        if let Some(failure) = self.record(IpamCall::GetNc(network_container_id.to_owned())) {
            return GetNetworkContainerResponse {
                response: failure,
                network_container: None,
            };
        }

        match lock(&self.containers).get(network_container_id) {
            Some(container) => GetNetworkContainerResponse {
                response: Response::success(),
                network_container: Some(container.clone()),
            },
            None => GetNetworkContainerResponse {
                response: Response::failure(ResponseCode::UnknownContainerId, "unknown"),
                network_container: None,
            },
        }
    }

    fn delete_nc(&self, network_container_id: &str) -> Response {
        if let Some(failure) = self.record(IpamCall::DeleteNc(network_container_id.to_owned())) {
            return failure;
        }

        lock(&self.containers).remove(network_container_id);

        Response::success()
    }
}

#[derive(Debug, Default)]
pub struct FakeDirectClient {
    node_network_config: Option<NodeNetworkConfig>,
    pods: Vec<Pod>,
    resource_type_missing: bool,
}

impl FakeDirectClient {
    pub fn with_node_network_config(node_network_config: NodeNetworkConfig) -> Self {
        Self {
            node_network_config: Some(node_network_config),
            ..Default::default()
        }
    }

    pub fn without_resource_type() -> Self {
        Self {
            resource_type_missing: true,
            ..Default::default()
        }
    }

    pub fn with_pods(mut self, pods: Vec<Pod>) -> Self {
        self.pods = pods;
        self
    }
}

#[async_trait]
impl DirectClient for FakeDirectClient {
    async fn get_node_network_config(
        &self,
        node_name: &str,
    ) -> Result<Option<NodeNetworkConfig>, ClusterClientError> {
        if self.resource_type_missing {
            return Err(ClusterClientError::ResourceTypeUndefined(
                "nodenetworkconfigs.acn.azure.com".to_owned(),
            ));
        }

        Ok(self
            .node_network_config
            .clone()
            .filter(|nnc| nnc.metadata.name.as_deref() == Some(node_name)))
    }

    async fn list_node_pods(&self, _node_name: &str) -> Result<Vec<Pod>, ClusterClientError> {
        Ok(self.pods.clone())
    }
}

/// Records `(namespace/name, state)` for every status write.
#[derive(Debug, Default)]
pub struct FakeStatusWriter {
    writes: Mutex<Vec<(String, MultiTenantNetworkContainerState)>>,
}

impl FakeStatusWriter {
    pub fn writes(&self) -> Vec<(String, MultiTenantNetworkContainerState)> {
        lock(&self.writes).clone()
    }
}

#[async_trait]
impl MultiTenantStatusWriter for FakeStatusWriter {
    async fn set_state(
        &self,
        name: &str,
        namespace: &str,
        state: MultiTenantNetworkContainerState,
    ) -> Result<(), kube::Error> {
        lock(&self.writes).push((format!("{namespace}/{name}"), state));

        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Fakes {
    pub ipam: Arc<FakeIpamService>,
    pub status_writer: Arc<FakeStatusWriter>,
}

/// Reconciler context wired to fresh fakes.
pub fn test_context() -> (Arc<ReconcilerContext>, Fakes) {
    let fakes = Fakes {
        ipam: Arc::new(FakeIpamService::default()),
        status_writer: Arc::new(FakeStatusWriter::default()),
    };
    let context = ReconcilerContext {
        ipam: IpamClient::new(fakes.ipam.clone()),
        metrics: Metrics::new().unwrap(),
        backoff: Backoff::new(),
        status_writer: fakes.status_writer.clone(),
    };

    (Arc::new(context), fakes)
}
