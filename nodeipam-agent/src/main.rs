use std::{process::exit, sync::Arc};

use anyhow::Context;
use clap::Parser;
use kube::Client;
use log::{error, info};
use nodeipam_agent::{
    bootstrap::{ApiPodInfoProvider, CniPodInfoProvider, PodInfoProvider},
    cluster::KubeDirectClient,
    config::{AgentConfig, InitSource},
    error::AgentError,
    helpers::EXIT_MISCONFIGURED,
    ipam::{local::LocalIpam, IpamClient},
    lifecycle::Agent,
    metrics::Metrics,
};
use nodeipam_core::crd::render_crds;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::parse();

    configure_logger(config.log_level());

    if config.print_crds {
        print!(
            "{}",
            render_crds().context("Couldn't render the custom resource definitions")?
        );
        return Ok(());
    }

    let node_name = config.node_name().map(str::to_owned).unwrap_or_else(|| {
        error!("NODENAME is not set!");
        exit(EXIT_MISCONFIGURED)
    });

    let client = create_client().await;
    let metrics = Metrics::new().unwrap_or_else(|error| {
        error!("Couldn't register metrics! {error:?}");
        exit(1)
    });

    let direct_client = Arc::new(KubeDirectClient::new(client.clone()));
    let pod_info: Arc<dyn PodInfoProvider> = match config.init_source {
        InitSource::Api => Arc::new(ApiPodInfoProvider::new(direct_client.clone())),
        InitSource::Cni => Arc::new(CniPodInfoProvider::new(config.cni_state_path.clone())),
    };
    let ipam = IpamClient::new(Arc::new(LocalIpam::new()));

    let agent = Agent::new(
        client,
        node_name,
        direct_client,
        pod_info,
        ipam,
        metrics,
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match agent.init(&cancel).await {
        Ok(()) => (),
        Err(AgentError::Cancelled) => return Ok(()),
        Err(error) if error.is_resource_type_undefined() => {
            error!("{error} Is the NodeNetworkConfig CRD installed?");
            exit(EXIT_MISCONFIGURED)
        }
        Err(error) => {
            error!("{error}");
            exit(1)
        }
    }

    if let Err(error) = agent.start(&cancel).await {
        error!("Couldn't start the controllers! {error}");
        exit(1)
    }

    info!(
        "Shutting down with {} IPs allocated to the node",
        agent.metrics().allocated_ips()
    );

    Ok(())
}

async fn create_client() -> Client {
    match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            error!("Couldn't create client! {error:?}");
            exit(1)
        }
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            error!("Couldn't listen for SIGTERM! {error:?}");
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        _ = terminate.recv() => info!("Received SIGTERM, shutting down..."),
    }

    cancel.cancel();
}

fn configure_logger(level: log::LevelFilter) {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(level)
        .parse_default_env()
        .init()
}
