use std::sync::Arc;

use crate::{backoff::Backoff, ipam::IpamClient, metrics::Metrics, status::MultiTenantStatusWriter};

pub struct ReconcilerContext {
    pub ipam: IpamClient,
    pub metrics: Metrics,
    pub backoff: Backoff,
    pub status_writer: Arc<dyn MultiTenantStatusWriter>,
}
