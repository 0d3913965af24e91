//! One-shot priming of the IPAM service, run before any watcher starts so
//! that addresses held by live pods are never handed out twice.

use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use log::{info, warn};
use nodeipam_core::{
    cni::{parse_pod_info_by_ip, CniStateError},
    crd::nodenetworkconfig::{NodeNetworkConfigSpec, Scaler},
    ipam::{PodInfo, PodInfoByIp},
    translate::{create_nc_request_from_status, TranslationError},
};
use thiserror::Error;

use crate::{
    cluster::{ClusterClientError, DirectClient},
    ipam::{IpamClient, IpamError},
};

#[derive(Debug, Error)]
pub enum PodInfoError {
    #[error("Couldn't list the node's pods! Reason: {}", .0)]
    Cluster(ClusterClientError),
    #[error("Couldn't read the CNI state file '{}'! Reason: {}", .0.display(), .1)]
    CniStateRead(PathBuf, std::io::Error),
    #[error("{}", .0)]
    CniState(CniStateError),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Couldn't fetch the node's NodeNetworkConfig! Reason: {}", .0)]
    Cluster(ClusterClientError),
    #[error("Couldn't translate the NodeNetworkConfig status! Reason: {}", .0)]
    Translation(TranslationError),
    #[error("Couldn't gather the node's pod IP bindings! Reason: {}", .0)]
    PodInfo(PodInfoError),
    #[error("Couldn't prime the IPAM service! Reason: {}", .0)]
    Ipam(IpamError),
}

impl BootstrapError {
    /// The custom resource type is missing, which no amount of retrying fixes.
    pub fn is_resource_type_undefined(&self) -> bool {
        matches!(
            self,
            Self::Cluster(ClusterClientError::ResourceTypeUndefined(_))
        )
    }
}

/// Source of the IP to pod bindings that exist on the node right now.
#[async_trait]
pub trait PodInfoProvider: Send + Sync {
    async fn pod_info_by_ip(&self, node_name: &str) -> Result<PodInfoByIp, PodInfoError>;
}

/// Reads bindings from the pods the cluster API has scheduled on the node.
pub struct ApiPodInfoProvider {
    client: Arc<dyn DirectClient>,
}

impl ApiPodInfoProvider {
    pub fn new(client: Arc<dyn DirectClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodInfoProvider for ApiPodInfoProvider {
    async fn pod_info_by_ip(&self, node_name: &str) -> Result<PodInfoByIp, PodInfoError> {
        let pods = self
            .client
            .list_node_pods(node_name)
            .await
            .map_err(PodInfoError::Cluster)?;

        Ok(pod_info_from_pods(&pods))
    }
}

/// Reads bindings from the CNI plugin's state file.
pub struct CniPodInfoProvider {
    state_path: PathBuf,
}

impl CniPodInfoProvider {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }
}

#[async_trait]
impl PodInfoProvider for CniPodInfoProvider {
    async fn pod_info_by_ip(&self, _node_name: &str) -> Result<PodInfoByIp, PodInfoError> {
        let raw = match tokio::fs::read_to_string(&self.state_path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                info!(
                    "CNI state file '{}' doesn't exist yet, assuming a fresh node",
                    self.state_path.display()
                );
                return Ok(PodInfoByIp::new());
            }
            Err(error) => return Err(PodInfoError::CniStateRead(self.state_path.clone(), error)),
        };

        parse_pod_info_by_ip(&raw).map_err(PodInfoError::CniState)
    }
}

/// Maps each pod's IP to its identity. Host-network pods share the node's
/// address and pods without an IP hold nothing, so both are left out.
pub fn pod_info_from_pods(pods: &[Pod]) -> PodInfoByIp {
    pods.iter()
        .filter(|pod| {
            !pod.spec
                .as_ref()
                .and_then(|spec| spec.host_network)
                .unwrap_or(false)
        })
        .filter_map(|pod| {
            let ip = pod
                .status
                .as_ref()
                .and_then(|status| status.pod_ip.as_deref())
                .filter(|ip| !ip.is_empty())?;
            let name = pod.metadata.name.as_deref()?;
            let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();

            Some((ip.to_owned(), PodInfo::new(name, namespace)))
        })
        .collect()
}

/// Hands the IPAM service the node's current network container together
/// with the pods already holding its addresses.
pub async fn initialize(
    client: &dyn DirectClient,
    pods: &dyn PodInfoProvider,
    ipam: &IpamClient,
    node_name: &str,
) -> Result<(), BootstrapError> {
    info!("Initializing IPAM state for node '{node_name}'...");

    let Some(node_network_config) = client
        .get_node_network_config(node_name)
        .await
        .map_err(BootstrapError::Cluster)?
    else {
        warn!("NodeNetworkConfig '{node_name}' doesn't exist yet, starting with an empty pool");

        return ipam
            .reconcile_nc_state(None, None, &Scaler::default(), &NodeNetworkConfigSpec::default())
            .map_err(BootstrapError::Ipam);
    };

    let scaler = node_network_config.scaler();
    let spec = &node_network_config.spec;

    let Some(status) = node_network_config
        .status
        .as_ref()
        .filter(|status| !status.network_containers.is_empty())
    else {
        info!("NodeNetworkConfig '{node_name}' has no network containers yet");

        return ipam
            .reconcile_nc_state(None, None, &scaler, spec)
            .map_err(BootstrapError::Ipam);
    };

    let request = create_nc_request_from_status(status).map_err(BootstrapError::Translation)?;
    let pod_info_by_ip = pods
        .pod_info_by_ip(node_name)
        .await
        .map_err(BootstrapError::PodInfo)?;

    ipam.reconcile_nc_state(Some(&request), Some(&pod_info_by_ip), &scaler, spec)
        .map_err(BootstrapError::Ipam)?;

    info!(
        "Restored network container '{}' with {} pod IP bindings",
        request.network_container_id,
        pod_info_by_ip.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{PodSpec, PodStatus};
    use kube::core::ObjectMeta;
    use nodeipam_core::crd::nodenetworkconfig::{
        IpAssignment, NetworkContainer, NodeNetworkConfig, NodeNetworkConfigStatus,
    };

    use crate::{
        ipam::{Response, ResponseCode},
        testing::{FakeDirectClient, FakeIpamService, IpamCall},
    };

    use super::*;

    fn pod(name: &str, ip: Option<&str>, host_network: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                host_network: Some(host_network),
                ..Default::default()
            }),
            status: Some(PodStatus {
                pod_ip: ip.map(str::to_owned),
                ..Default::default()
            }),
        }
    }

    fn node_network_config(ncs: Vec<NetworkContainer>) -> NodeNetworkConfig {
        let mut nnc = NodeNetworkConfig::new(
            "node-1",
            NodeNetworkConfigSpec {
                requested_ip_count: 16,
                ips_not_in_use: vec![],
            },
        );
        nnc.status = Some(NodeNetworkConfigStatus {
            scaler: Scaler {
                batch_size: 16,
                max_ip_count: 250,
                ..Default::default()
            },
            network_containers: ncs,
        });
        nnc
    }

    fn network_container() -> NetworkContainer {
        NetworkContainer {
            id: "nc1".to_owned(),
            primary_ip: "10.0.0.1".to_owned(),
            subnet_address_space: "10.0.0.0/24".to_owned(),
            default_gateway: "10.0.0.2".to_owned(),
            ip_assignments: vec![IpAssignment {
                name: "uuid-a".to_owned(),
                ip: "10.0.0.5".to_owned(),
            }],
            version: 1,
            ..Default::default()
        }
    }

    async fn run(client: FakeDirectClient) -> (Result<(), BootstrapError>, Arc<FakeIpamService>) {
        let ipam = Arc::new(FakeIpamService::default());
        let client = Arc::new(client);
        let pods = ApiPodInfoProvider::new(client.clone());

        let result = initialize(
            client.as_ref(),
            &pods,
            &IpamClient::new(ipam.clone()),
            "node-1",
        )
        .await;

        (result, ipam)
    }

    #[test]
    fn host_network_and_ipless_pods_are_skipped() {
        let pods = vec![
            pod("pod-a", Some("10.0.0.5"), false),
            pod("pod-b", Some("10.240.0.4"), true),
            pod("pod-c", None, false),
        ];

        let bindings = pod_info_from_pods(&pods);

        assert_eq!(
            bindings,
            PodInfoByIp::from([("10.0.0.5".to_owned(), PodInfo::new("pod-a", "default"))])
        );
    }

    #[tokio::test]
    async fn missing_pool_object_primes_empty_state() {
        let (result, ipam) = run(FakeDirectClient::default()).await;

        result.unwrap();
        assert_eq!(
            ipam.calls(),
            vec![IpamCall::ReconcileNcState {
                request: None,
                pod_info_by_ip: None,
                scaler: Scaler::default(),
                spec: NodeNetworkConfigSpec::default(),
            }]
        );
    }

    #[tokio::test]
    async fn pool_object_without_containers_primes_empty_state() {
        let nnc = node_network_config(vec![]);
        let (result, ipam) = run(FakeDirectClient::with_node_network_config(nnc.clone())).await;

        result.unwrap();
        assert_eq!(
            ipam.calls(),
            vec![IpamCall::ReconcileNcState {
                request: None,
                pod_info_by_ip: None,
                scaler: nnc.scaler(),
                spec: nnc.spec.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn existing_pod_bindings_are_restored() {
        let nnc = node_network_config(vec![network_container()]);
        let client = FakeDirectClient::with_node_network_config(nnc.clone()).with_pods(vec![
            pod("pod-a", Some("10.0.0.5"), false),
            pod("pod-b", Some("10.240.0.4"), true),
        ]);

        let (result, ipam) = run(client).await;

        result.unwrap();
        let calls = ipam.calls();
        assert_eq!(calls.len(), 1);
        let IpamCall::ReconcileNcState {
            request: Some(request),
            pod_info_by_ip: Some(pod_info_by_ip),
            scaler,
            spec,
        } = &calls[0]
        else {
            panic!("unexpected call {:?}", calls[0]);
        };
        assert_eq!(request.network_container_id, "nc1");
        assert_eq!(
            pod_info_by_ip,
            &PodInfoByIp::from([("10.0.0.5".to_owned(), PodInfo::new("pod-a", "default"))])
        );
        assert_eq!(scaler, &nnc.scaler());
        assert_eq!(spec, &nnc.spec);
    }

    #[tokio::test]
    async fn undefined_resource_type_is_reported() {
        let (result, ipam) = run(FakeDirectClient::without_resource_type()).await;

        assert!(result.unwrap_err().is_resource_type_undefined());
        assert!(ipam.calls().is_empty());
    }

    #[tokio::test]
    async fn translation_errors_propagate() {
        let mut nc = network_container();
        nc.primary_ip = "10.0.0.0.0".to_owned();

        let (result, ipam) =
            run(FakeDirectClient::with_node_network_config(node_network_config(vec![nc]))).await;

        assert!(matches!(result, Err(BootstrapError::Translation(_))));
        assert!(ipam.calls().is_empty());
    }

    #[tokio::test]
    async fn ipam_failure_propagates() {
        let ipam = Arc::new(FakeIpamService::default());
        ipam.fail_with(Response::failure(ResponseCode::InvalidParameter, "nope"));
        let client = FakeDirectClient::default();

        let result = initialize(
            &client,
            &CniPodInfoProvider::new("/nonexistent"),
            &IpamClient::new(ipam.clone()),
            "node-1",
        )
        .await;

        assert!(matches!(result, Err(BootstrapError::Ipam(_))));
    }

    #[tokio::test]
    async fn missing_cni_state_means_fresh_node() {
        let provider = CniPodInfoProvider::new("/nonexistent/azure-vnet.json");

        assert!(provider.pod_info_by_ip("node-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cni_state_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("nodeipam-cni-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "Network": { "ExternalInterfaces": { "eth0": { "Networks": { "azure": {
                "Endpoints": { "e1": {
                    "IPAddresses": [{ "IP": "10.0.0.5", "Mask": "////AA==" }],
                    "PODName": "pod-a",
                    "PODNameSpace": "default"
                } }
            } } } } } }"#,
        )
        .unwrap();

        let bindings = CniPodInfoProvider::new(&path)
            .pod_info_by_ip("node-1")
            .await
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            bindings,
            PodInfoByIp::from([("10.0.0.5".to_owned(), PodInfo::new("pod-a", "default"))])
        );
    }
}
