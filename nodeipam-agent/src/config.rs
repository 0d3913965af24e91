use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use nodeipam_core::cni::DEFAULT_CNI_STATE_PATH;

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct AgentConfig {
    /// name of the cluster node this agent manages
    #[arg(long, env = "NODENAME")]
    pub node_name: Option<String>,
    /// where the existing pod IP bindings are read from on startup
    #[arg(long, env = "NODEIPAM_INIT_SOURCE", value_enum, default_value_t = InitSource::Api)]
    pub init_source: InitSource,
    /// CNI state file consulted when initializing from the CNI
    #[arg(long, env = "NODEIPAM_CNI_STATE_PATH", default_value = DEFAULT_CNI_STATE_PATH)]
    pub cni_state_path: PathBuf,
    /// print the custom resource definitions used by the agent and exit
    #[arg(long)]
    pub print_crds: bool,
    /// enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose_logging: bool,
}

impl AgentConfig {
    /// Node name with surrounding whitespace removed, `None` when unset or blank.
    pub fn node_name(&self) -> Option<&str> {
        self.node_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose_logging {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InitSource {
    /// list the node's pods from the cluster API
    Api,
    /// read the bindings from the CNI state file
    Cni,
}
