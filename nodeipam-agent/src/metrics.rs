use prometheus::{IntGauge, Registry};

pub const ALLOCATED_IPS_METRIC: &str = "nodeipam_allocated_ips";

/// Observations published by the agent. Exposition is left to whoever owns
/// the registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    allocated_ips: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let allocated_ips = IntGauge::new(
            ALLOCATED_IPS_METRIC,
            "Number of secondary IPs assigned to this node's network container",
        )?;

        registry.register(Box::new(allocated_ips.clone()))?;

        Ok(Self {
            registry,
            allocated_ips,
        })
    }

    pub fn observe_allocated_ips(&self, count: usize) {
        self.allocated_ips
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn allocated_ips(&self) -> i64 {
        self.allocated_ips.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
