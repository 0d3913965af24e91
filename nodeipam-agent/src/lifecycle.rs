//! Owns the bootstrap and both controllers and enforces that the IPAM
//! service is primed before any reconciliation runs.

use std::{
    pin::pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::{self, Either};
use kube::Client;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::Backoff,
    bootstrap::{initialize, PodInfoProvider},
    cluster::DirectClient,
    controller::{
        multitenant::run_multitenant_controller,
        nodenetworkconfig::{run_node_network_config_controller, NodeNetworkConfigSpecWriter},
        SHUTDOWN_GRACE_PERIOD,
    },
    error::AgentError,
    ipam::IpamClient,
    metrics::Metrics,
    reconciler::context::ReconcilerContext,
    status::KubeStatusWriter,
};

#[derive(Debug, Default)]
struct LifecycleState {
    initializing: bool,
    initialized: bool,
    started: bool,
}

pub struct Agent {
    client: Client,
    node_name: String,
    direct_client: Arc<dyn DirectClient>,
    pod_info: Arc<dyn PodInfoProvider>,
    context: Arc<ReconcilerContext>,
    spec_writer: NodeNetworkConfigSpecWriter,
    shutdown_grace: Duration,
    state: Mutex<LifecycleState>,
}

impl Agent {
    pub fn new(
        client: Client,
        node_name: impl Into<String>,
        direct_client: Arc<dyn DirectClient>,
        pod_info: Arc<dyn PodInfoProvider>,
        ipam: IpamClient,
        metrics: Metrics,
    ) -> Self {
        let node_name = node_name.into();
        let context = ReconcilerContext {
            ipam,
            metrics,
            backoff: Backoff::new(),
            status_writer: Arc::new(KubeStatusWriter::new(client.clone())),
        };

        Self {
            spec_writer: NodeNetworkConfigSpecWriter::new(client.clone(), node_name.clone()),
            client,
            node_name,
            direct_client,
            pod_info,
            context: Arc::new(context),
            shutdown_grace: SHUTDOWN_GRACE_PERIOD,
            state: Default::default(),
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Primes the IPAM service with the node's current state. Only one
    /// successful call is allowed, and never while the controllers run.
    pub async fn init(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        {
            let mut state = self.lock_state();

            if state.initializing || state.initialized || state.started {
                return Err(AgentError::AlreadyInitialized);
            }

            state.initializing = true;
        }

        let result = self.bootstrap(cancel).await;

        let mut state = self.lock_state();
        state.initializing = false;
        state.initialized = result.is_ok();
        drop(state);

        if result.is_ok() {
            info!("IPAM state for node '{}' initialized", self.node_name);
        }

        result
    }

    async fn bootstrap(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let bootstrap = initialize(
            self.direct_client.as_ref(),
            self.pod_info.as_ref(),
            &self.context.ipam,
            &self.node_name,
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = bootstrap => result.map_err(AgentError::Bootstrap),
        }
    }

    /// Runs both controllers until `cancel` fires or either of them stops,
    /// in which case the other one is shut down as well.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        {
            let mut state = self.lock_state();

            if !state.initialized {
                return Err(AgentError::NotInitialized);
            }

            if state.started {
                return Err(AgentError::AlreadyStarted);
            }

            state.started = true;
        }

        let shutdown = cancel.child_token();
        let node_network_config = pin!(run_node_network_config_controller(
            self.client.clone(),
            &self.node_name,
            self.context.clone(),
            &self.spec_writer,
            shutdown.clone(),
            self.shutdown_grace,
        ));
        let multitenant = pin!(run_multitenant_controller(
            self.client.clone(),
            &self.node_name,
            self.context.clone(),
            shutdown.clone(),
            self.shutdown_grace,
        ));

        match future::select(node_network_config, multitenant).await {
            Either::Left((_, remaining)) => {
                shutdown.cancel();
                remaining.await
            }
            Either::Right((_, remaining)) => {
                shutdown.cancel();
                remaining.await
            }
        }

        self.lock_state().started = false;

        info!("Controllers for node '{}' stopped", self.node_name);

        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.lock_state().started
    }

    pub fn spec_writer(&self) -> &NodeNetworkConfigSpecWriter {
        &self.spec_writer
    }

    pub fn metrics(&self) -> &Metrics {
        &self.context.metrics
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
