use std::sync::Arc;

use kube::{runtime::controller::Action, ResourceExt};
use log::{debug, info};
use nodeipam_core::{
    crd::nodenetworkconfig::NodeNetworkConfig, translate::create_nc_request_from_status,
};

use super::{backoff_key, context::ReconcilerContext, error::ReconcilerError};

/// Hands the node's network container to the IPAM service and refreshes the
/// pool monitor. Nothing is requeued on success, the next status change
/// triggers the next pass.
pub async fn reconcile_node_network_config(
    object: Arc<NodeNetworkConfig>,
    context: Arc<ReconcilerContext>,
) -> Result<Action, ReconcilerError> {
    try_reconcile(&object, &context)?;

    context.backoff.reset(&backoff_key(object.as_ref()));

    Ok(Action::await_change())
}

fn try_reconcile(
    object: &NodeNetworkConfig,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let Some(status) = object
        .status
        .as_ref()
        .filter(|status| !status.network_containers.is_empty())
    else {
        debug!(
            "NodeNetworkConfig '{}' has no network containers yet",
            object.name_any()
        );
        return Ok(());
    };

    let request = create_nc_request_from_status(status).map_err(ReconcilerError::Translation)?;

    context
        .ipam
        .create_or_update_nc(&request)
        .map_err(ReconcilerError::Ipam)?;
    context.ipam.update_pool_monitor(&status.scaler, &object.spec);

    let allocated = status
        .network_containers
        .first()
        .map_or(0, |nc| nc.ip_assignments.len());
    context.metrics.observe_allocated_ips(allocated);

    info!(
        "Synced network container '{}' (version {}) of NodeNetworkConfig '{}' with {allocated} IPs",
        request.network_container_id,
        request.version,
        object.name_any()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nodeipam_core::{
        crd::nodenetworkconfig::{
            IpAssignment, NetworkContainer, NodeNetworkConfigSpec, NodeNetworkConfigStatus, Scaler,
        },
        ipam::{
            CreateNetworkContainerRequest, IpConfiguration, IpSubnet, NetworkContainerType,
            SecondaryIpConfig,
        },
    };

    use crate::{
        ipam::{IpamError, Response, ResponseCode},
        reconciler::reconcile_error_policy,
        testing::{test_context, IpamCall},
    };

    use super::*;

    fn node_network_config(ncs: Vec<NetworkContainer>) -> Arc<NodeNetworkConfig> {
        let mut nnc = NodeNetworkConfig::new(
            "node-1",
            NodeNetworkConfigSpec {
                requested_ip_count: 16,
                ips_not_in_use: vec!["uuid-z".to_owned()],
            },
        );
        nnc.status = Some(NodeNetworkConfigStatus {
            scaler: Scaler {
                batch_size: 16,
                release_threshold_percent: 150,
                request_threshold_percent: 50,
                max_ip_count: 250,
            },
            network_containers: ncs,
        });

        Arc::new(nnc)
    }

    fn network_container() -> NetworkContainer {
        NetworkContainer {
            id: "nc1".to_owned(),
            primary_ip: "10.0.0.1".to_owned(),
            subnet_name: "subnet".to_owned(),
            subnet_address_space: "10.0.0.0/24".to_owned(),
            default_gateway: "10.0.0.2".to_owned(),
            ip_assignments: vec![IpAssignment {
                name: "uuid-a".to_owned(),
                ip: "10.0.0.5".to_owned(),
            }],
            version: 1,
        }
    }

    #[tokio::test]
    async fn empty_status_leaves_ipam_alone() {
        let (context, fakes) = test_context();

        let action = reconcile_node_network_config(node_network_config(vec![]), context)
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        assert!(fakes.ipam.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_status_leaves_ipam_alone() {
        let (context, fakes) = test_context();
        let nnc = NodeNetworkConfig::new("node-1", NodeNetworkConfigSpec::default());

        reconcile_node_network_config(Arc::new(nnc), context)
            .await
            .unwrap();

        assert!(fakes.ipam.calls().is_empty());
    }

    #[tokio::test]
    async fn populated_status_is_handed_to_ipam() {
        let (context, fakes) = test_context();
        let nnc = node_network_config(vec![network_container()]);

        reconcile_node_network_config(nnc.clone(), context.clone())
            .await
            .unwrap();

        let expected = CreateNetworkContainerRequest {
            network_container_id: "nc1".to_owned(),
            network_container_type: NetworkContainerType::Docker,
            version: "1".to_owned(),
            ip_configuration: IpConfiguration {
                ip_subnet: IpSubnet {
                    ip_address: "10.0.0.1".parse().unwrap(),
                    prefix_length: 24,
                },
                gateway_ip_address: Some("10.0.0.2".parse().unwrap()),
            },
            secondary_ip_configs: BTreeMap::from([(
                "uuid-a".to_owned(),
                SecondaryIpConfig {
                    ip_address: "10.0.0.5".parse().unwrap(),
                    nc_version: 1,
                },
            )]),
            ..Default::default()
        };
        let status = nnc.status.as_ref().unwrap();
        assert_eq!(
            fakes.ipam.calls(),
            vec![
                IpamCall::CreateOrUpdateNc(expected),
                IpamCall::UpdatePoolMonitor {
                    scaler: status.scaler,
                    spec: nnc.spec.clone(),
                },
            ]
        );
        assert_eq!(context.metrics.allocated_ips(), 1);
    }

    #[tokio::test]
    async fn malformed_primary_ip_fails_before_ipam() {
        let (context, fakes) = test_context();
        let mut nc = network_container();
        nc.primary_ip = "10.0.0.0.0".to_owned();

        let result = reconcile_node_network_config(node_network_config(vec![nc]), context).await;

        assert!(matches!(result, Err(ReconcilerError::Translation(_))));
        assert!(fakes.ipam.calls().is_empty());
    }

    #[tokio::test]
    async fn ipam_failure_is_returned_for_requeue() {
        let (context, fakes) = test_context();
        fakes
            .ipam
            .fail_with(Response::failure(ResponseCode::InvalidParameter, "bad"));
        let nnc = node_network_config(vec![network_container()]);

        let error = reconcile_node_network_config(nnc.clone(), context.clone())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ReconcilerError::Ipam(IpamError::Service {
                code: ResponseCode::InvalidParameter,
                ..
            })
        ));
        assert_eq!(fakes.ipam.calls().len(), 1);
        assert_ne!(
            reconcile_error_policy(nnc, &error, context),
            Action::await_change()
        );
    }

    #[tokio::test]
    async fn success_resets_backoff() {
        let (context, _) = test_context();
        let nnc = node_network_config(vec![network_container()]);
        let error = ReconcilerError::MissingObjectMetadata;
        reconcile_error_policy(nnc.clone(), &error, context.clone());
        reconcile_error_policy(nnc.clone(), &error, context.clone());

        reconcile_node_network_config(nnc.clone(), context.clone())
            .await
            .unwrap();

        assert_eq!(
            reconcile_error_policy(nnc, &error, context),
            Action::requeue(std::time::Duration::from_secs(1))
        );
    }
}
