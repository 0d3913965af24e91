use nodeipam_core::translate::TranslationError;
use thiserror::Error;

use crate::ipam::IpamError;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Object is missing metadata!")]
    MissingObjectMetadata,
    #[error("Couldn't build the IPAM request! Reason: {}", .0)]
    Translation(TranslationError),
    #[error("IPAM service rejected the request! Reason: {}", .0)]
    Ipam(IpamError),
    #[error("Couldn't update the resource! Reason: {}", .0)]
    KubeApiError(kube::Error),
}
