//! Uncached access to the cluster API, used before any watcher is running.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, CustomResourceExt};
use nodeipam_core::{
    crd::nodenetworkconfig::NodeNetworkConfig,
    kubernetes::operations::{is_resource_type_defined, list_node_pods, try_get_resource},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterClientError {
    #[error("Custom resource type '{}' is not defined on the cluster!", .0)]
    ResourceTypeUndefined(String),
    #[error("Cluster API request failed! Reason: {}", .0)]
    Kube(kube::Error),
}

#[async_trait]
pub trait DirectClient: Send + Sync {
    /// `Ok(None)` when the type exists but this node has no object yet.
    async fn get_node_network_config(
        &self,
        node_name: &str,
    ) -> Result<Option<NodeNetworkConfig>, ClusterClientError>;

    async fn list_node_pods(&self, node_name: &str) -> Result<Vec<Pod>, ClusterClientError>;
}

pub struct KubeDirectClient {
    client: Client,
}

impl KubeDirectClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DirectClient for KubeDirectClient {
    async fn get_node_network_config(
        &self,
        node_name: &str,
    ) -> Result<Option<NodeNetworkConfig>, ClusterClientError> {
        let defined = is_resource_type_defined::<NodeNetworkConfig>(&self.client)
            .await
            .map_err(ClusterClientError::Kube)?;

        if !defined {
            return Err(ClusterClientError::ResourceTypeUndefined(
                NodeNetworkConfig::crd_name().to_owned(),
            ));
        }

        let api: Api<NodeNetworkConfig> = Api::all(self.client.clone());

        try_get_resource(&api, node_name)
            .await
            .map_err(ClusterClientError::Kube)
    }

    async fn list_node_pods(&self, node_name: &str) -> Result<Vec<Pod>, ClusterClientError> {
        list_node_pods(&self.client, node_name)
            .await
            .map_err(ClusterClientError::Kube)
    }
}
