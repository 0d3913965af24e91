use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use kube::{
    runtime::{
        reflector::{self, reflector},
        watcher::{watcher, Config},
        Controller, WatchStreamExt,
    },
    Api, Client,
};
use log::info;
use nodeipam_core::crd::multitenantnetworkcontainer::MultiTenantNetworkContainer;
use tokio_util::sync::CancellationToken;

use crate::{
    controller::run_until_shutdown,
    events::{filtered_trigger_stream, MultiTenantNetworkContainerFilter},
    helpers::handle_reconciliation_result,
    reconciler::{
        context::ReconcilerContext, multitenant::reconcile_multitenant_network_container,
        reconcile_error_policy,
    },
};

/// Watches multi-tenant containers of every namespace, reconciling those
/// scheduled on `node_name`, until `shutdown` is cancelled.
pub async fn run_multitenant_controller(
    client: Client,
    node_name: &str,
    context: Arc<ReconcilerContext>,
    shutdown: CancellationToken,
    grace: Duration,
) {
    info!("Creating MultiTenantNetworkContainer controller...");

    let api: Api<MultiTenantNetworkContainer> = Api::all(client);
    let (store, writer) = reflector::store();
    let events = reflector(writer, watcher(api, Config::default()).default_backoff());
    let trigger =
        filtered_trigger_stream(events, MultiTenantNetworkContainerFilter::new(node_name));

    let controller = Controller::for_stream(trigger, store)
        .graceful_shutdown_on(shutdown.clone().cancelled_owned())
        .run(
            reconcile_multitenant_network_container,
            reconcile_error_policy,
            context,
        )
        .for_each(handle_reconciliation_result);

    info!("MultiTenantNetworkContainer controller created!");

    run_until_shutdown("MultiTenantNetworkContainer", controller, &shutdown, grace).await
}
