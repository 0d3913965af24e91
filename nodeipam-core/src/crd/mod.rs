use kube::CustomResourceExt;

use self::{
    multitenantnetworkcontainer::MultiTenantNetworkContainer,
    nodenetworkconfig::NodeNetworkConfig,
};

pub mod multitenantnetworkcontainer;
pub mod nodenetworkconfig;

/// Renders every definition this agent consumes as a multi-document YAML
/// manifest, ready to be applied by the platform installer.
pub fn render_crds() -> Result<String, serde_yaml::Error> {
    let documents = [
        serde_yaml::to_string(&NodeNetworkConfig::crd())?,
        serde_yaml::to_string(&MultiTenantNetworkContainer::crd())?,
    ];

    Ok(documents.join("---\n"))
}
