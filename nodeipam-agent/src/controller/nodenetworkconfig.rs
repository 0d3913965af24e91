use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use futures::StreamExt;
use kube::{
    runtime::{
        reflector::{self, reflector, ObjectRef, Store},
        watcher::{watcher, Config},
        Controller, WatchStreamExt,
    },
    Api, Client,
};
use log::{info, warn};
use nodeipam_core::{
    crd::nodenetworkconfig::{NodeNetworkConfig, NodeNetworkConfigSpec},
    kubernetes::{is_conflict, operations::replace_resource},
};
use tokio_util::sync::CancellationToken;

use crate::{
    controller::run_until_shutdown,
    events::{filtered_trigger_stream, NodeNetworkConfigFilter},
    helpers::handle_reconciliation_result,
    reconciler::{
        context::ReconcilerContext, nodenetworkconfig::reconcile_node_network_config,
        reconcile_error_policy,
    },
};

/// Watches the node's `NodeNetworkConfig` until `shutdown` is cancelled.
/// The reflector's store is published through `spec_writer`.
pub async fn run_node_network_config_controller(
    client: Client,
    node_name: &str,
    context: Arc<ReconcilerContext>,
    spec_writer: &NodeNetworkConfigSpecWriter,
    shutdown: CancellationToken,
    grace: Duration,
) {
    info!("Creating NodeNetworkConfig controller...");

    let api: Api<NodeNetworkConfig> = Api::all(client);
    let watcher_config = Config::default().fields(&format!("metadata.name={node_name}"));
    let (store, writer) = reflector::store();
    let events = reflector(writer, watcher(api, watcher_config).default_backoff());
    let trigger = filtered_trigger_stream(events, NodeNetworkConfigFilter::new(node_name));

    spec_writer.attach_store(store.clone());

    let controller = Controller::for_stream(trigger, store)
        .graceful_shutdown_on(shutdown.clone().cancelled_owned())
        .run(
            reconcile_node_network_config,
            reconcile_error_policy,
            context,
        )
        .for_each(handle_reconciliation_result);

    info!("NodeNetworkConfig controller created!");

    run_until_shutdown("NodeNetworkConfig", controller, &shutdown, grace).await;

    spec_writer.detach_store();
}

/// Pushes a new desired pool size and release list into the node's
/// `NodeNetworkConfig` spec.
#[derive(Clone)]
pub struct NodeNetworkConfigSpecWriter {
    api: Api<NodeNetworkConfig>,
    node_name: String,
    store: Arc<RwLock<Option<Store<NodeNetworkConfig>>>>,
}

impl NodeNetworkConfigSpecWriter {
    pub fn new(client: Client, node_name: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            node_name: node_name.into(),
            store: Default::default(),
        }
    }

    /// Replaces the spec, relying on `resourceVersion` to reject writes based
    /// on a stale copy. Errors are returned for the caller to retry.
    pub async fn update_crd_spec(
        &self,
        spec: &NodeNetworkConfigSpec,
    ) -> Result<NodeNetworkConfig, kube::Error> {
        let current = match self.cached() {
            Some(cached) => cached,
            None => self.api.get(&self.node_name).await?,
        };

        let updated = with_spec(current, spec);

        replace_resource(&self.api, &updated).await.map_err(|error| {
            if is_conflict(&error) {
                warn!(
                    "NodeNetworkConfig '{}' changed while its spec was being updated",
                    self.node_name
                );
            }
            error
        })
    }

    fn cached(&self) -> Option<NodeNetworkConfig> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()?
            .get(&ObjectRef::new(&self.node_name))
            .map(|nnc| nnc.as_ref().clone())
    }

    fn attach_store(&self, store: Store<NodeNetworkConfig>) {
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
    }

    fn detach_store(&self) {
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn with_spec(mut current: NodeNetworkConfig, spec: &NodeNetworkConfigSpec) -> NodeNetworkConfig {
    current.spec = spec.clone();
    current
}
