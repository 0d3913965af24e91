//! Facade over the node-local IPAM service.
//!
//! The service reports outcomes as a numeric code plus a message. The facade
//! turns those into [`IpamError`] so callers only ever match on `NotFound`.

use std::{fmt::Display, sync::Arc};

use nodeipam_core::{
    crd::nodenetworkconfig::{NodeNetworkConfigSpec, Scaler},
    ipam::{CreateNetworkContainerRequest, PodInfoByIp},
};
use thiserror::Error;

pub mod local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    InvalidParameter,
    NotFound,
    UnknownContainerId,
    UnsupportedNetworkContainerType,
    InconsistentIpConfigState,
    Other(i32),
}

impl ResponseCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            2 => Self::InvalidParameter,
            14 => Self::NotFound,
            18 => Self::UnknownContainerId,
            19 => Self::UnsupportedNetworkContainerType,
            40 => Self::InconsistentIpConfigState,
            code => Self::Other(code),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InvalidParameter => 2,
            Self::NotFound => 14,
            Self::UnknownContainerId => 18,
            Self::UnsupportedNetworkContainerType => 19,
            Self::InconsistentIpConfigState => 40,
            Self::Other(code) => *code,
        }
    }
}

impl Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({self:?})", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub message: String,
}

impl Response {
    pub fn success() -> Self {
        Self {
            code: ResponseCode::Success,
            message: String::new(),
        }
    }

    pub fn failure(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetNetworkContainerResponse {
    pub response: Response,
    pub network_container: Option<CreateNetworkContainerRequest>,
}

/// Operations the IPAM service exposes to the control plane.
///
/// Calls are synchronous and the service does its own locking, so one
/// instance is shared by every reconciler.
pub trait IpamService: Send + Sync {
    /// Primes the service on startup. `None` means there is no NC yet.
    fn reconcile_nc_state(
        &self,
        request: Option<&CreateNetworkContainerRequest>,
        pod_info_by_ip: Option<&PodInfoByIp>,
        scaler: &Scaler,
        spec: &NodeNetworkConfigSpec,
    ) -> Response;

    fn create_or_update_nc(&self, request: &CreateNetworkContainerRequest) -> Response;

    fn update_pool_monitor(&self, scaler: &Scaler, spec: &NodeNetworkConfigSpec);

    fn get_nc(&self, network_container_id: &str) -> GetNetworkContainerResponse;

    fn delete_nc(&self, network_container_id: &str) -> Response;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpamError {
    #[error("Network container '{}' is not known to the IPAM service!", .0)]
    NotFound(String),
    #[error("IPAM service failed with code {code}! Reason: {message}")]
    Service { code: ResponseCode, message: String },
}

/// Typed entry point into an [`IpamService`]. Performs no retries and no
/// locking of its own.
#[derive(Clone)]
pub struct IpamClient {
    service: Arc<dyn IpamService>,
}

impl IpamClient {
    pub fn new(service: Arc<dyn IpamService>) -> Self {
        Self { service }
    }

    pub fn reconcile_nc_state(
        &self,
        request: Option<&CreateNetworkContainerRequest>,
        pod_info_by_ip: Option<&PodInfoByIp>,
        scaler: &Scaler,
        spec: &NodeNetworkConfigSpec,
    ) -> Result<(), IpamError> {
        let id = request
            .map(|request| request.network_container_id.as_str())
            .unwrap_or_default();

        into_result(
            id,
            self.service
                .reconcile_nc_state(request, pod_info_by_ip, scaler, spec),
        )
    }

    pub fn create_or_update_nc(
        &self,
        request: &CreateNetworkContainerRequest,
    ) -> Result<(), IpamError> {
        into_result(
            &request.network_container_id,
            self.service.create_or_update_nc(request),
        )
    }

    pub fn update_pool_monitor(&self, scaler: &Scaler, spec: &NodeNetworkConfigSpec) {
        self.service.update_pool_monitor(scaler, spec)
    }

    pub fn get_nc(
        &self,
        network_container_id: &str,
    ) -> Result<CreateNetworkContainerRequest, IpamError> {
        let GetNetworkContainerResponse {
            response,
            network_container,
        } = self.service.get_nc(network_container_id);

        into_result(network_container_id, response)?;

        network_container.ok_or_else(|| IpamError::NotFound(network_container_id.to_owned()))
    }

    pub fn delete_nc(&self, network_container_id: &str) -> Result<(), IpamError> {
        into_result(
            network_container_id,
            self.service.delete_nc(network_container_id),
        )
    }
}

fn into_result(network_container_id: &str, response: Response) -> Result<(), IpamError> {
    match response.code {
        ResponseCode::Success => Ok(()),
        ResponseCode::NotFound | ResponseCode::UnknownContainerId => {
            Err(IpamError::NotFound(network_container_id.to_owned()))
        }
        code => Err(IpamError::Service {
            code,
            message: response.message,
        }),
    }
}
