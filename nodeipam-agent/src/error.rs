use thiserror::Error;

use crate::bootstrap::BootstrapError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("The agent has to be initialized before it's started!")]
    NotInitialized,
    #[error("The agent has already been initialized!")]
    AlreadyInitialized,
    #[error("The agent is already running!")]
    AlreadyStarted,
    #[error("Cancelled before the agent was initialized!")]
    Cancelled,
    #[error("Couldn't initialize the IPAM state! Reason: {}", .0)]
    Bootstrap(BootstrapError),
}

impl AgentError {
    pub fn is_resource_type_undefined(&self) -> bool {
        matches!(self, Self::Bootstrap(error) if error.is_resource_type_undefined())
    }
}
