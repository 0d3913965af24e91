use std::sync::Arc;

use kube::runtime::controller::Action;
use log::{debug, info};
use nodeipam_core::{
    crd::multitenantnetworkcontainer::{
        MultiTenantNetworkContainer, MultiTenantNetworkContainerState,
    },
    helpers::{IsTombstoned, RequireMetadata},
    translate::create_nc_request_from_multitenant,
};

use crate::ipam::IpamError;

use super::{backoff_key, context::ReconcilerContext, error::ReconcilerError};

/// Drives a multi-tenant container through its lifecycle:
///
/// - tombstoned and not yet `Terminated`: the NC is removed from the IPAM
///   service and the object is marked `Terminated`
/// - `Initialized` and unknown to the IPAM service: the NC is created and
///   the object is marked `Succeeded`
/// - anything else is left alone
pub async fn reconcile_multitenant_network_container(
    object: Arc<MultiTenantNetworkContainer>,
    context: Arc<ReconcilerContext>,
) -> Result<Action, ReconcilerError> {
    try_reconcile(&object, &context).await?;

    context.backoff.reset(&backoff_key(object.as_ref()));

    Ok(Action::await_change())
}

async fn try_reconcile(
    object: &MultiTenantNetworkContainer,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let name = object.require_name_or(ReconcilerError::MissingObjectMetadata)?;
    let namespace = object.require_namespace_or(ReconcilerError::MissingObjectMetadata)?;
    let uuid = &object.spec.uuid;
    let state = object.state();

    if object.is_tombstoned() {
        if state == MultiTenantNetworkContainerState::Terminated {
            return Ok(());
        }

        context
            .ipam
            .delete_nc(uuid)
            .map_err(ReconcilerError::Ipam)?;
        set_state(context, name, namespace, MultiTenantNetworkContainerState::Terminated).await?;

        info!("Released network container '{uuid}' of {namespace}/{name}");

        return Ok(());
    }

    if state != MultiTenantNetworkContainerState::Initialized {
        debug!("{namespace}/{name} is {state}, waiting for the control plane");
        return Ok(());
    }

    match context.ipam.get_nc(uuid) {
        Ok(_) => Ok(()),
        Err(IpamError::NotFound(_)) => {
            let request = create_nc_request_from_multitenant(object)
                .map_err(ReconcilerError::Translation)?;

            context
                .ipam
                .create_or_update_nc(&request)
                .map_err(ReconcilerError::Ipam)?;
            set_state(context, name, namespace, MultiTenantNetworkContainerState::Succeeded).await?;

            info!("Created network container '{uuid}' for {namespace}/{name}");

            Ok(())
        }
        Err(error) => Err(ReconcilerError::Ipam(error)),
    }
}

async fn set_state(
    context: &ReconcilerContext,
    name: &str,
    namespace: &str,
    state: MultiTenantNetworkContainerState,
) -> Result<(), ReconcilerError> {
    context
        .status_writer
        .set_state(name, namespace, state)
        .await
        .map_err(ReconcilerError::KubeApiError)
}
