use std::fmt::Debug;

use k8s_openapi::{
    api::core::v1::Pod,
    serde::{de::DeserializeOwned, Serialize},
};
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    core::GroupVersionKind,
    Api, Client, Resource,
};
use log::{debug, info};

use crate::helpers::pretty_type_name;

/// Fetches `name`, mapping a 404 to `None`.
pub async fn try_get_resource<T>(api: &Api<T>, name: &str) -> Result<Option<T>, kube::Error>
where
    T: Clone + DeserializeOwned + Debug,
{
    api.get_opt(name).await
}

/// Checks through discovery whether the api server serves `T` at all.
pub async fn is_resource_type_defined<T>(client: &Client) -> Result<bool, kube::Error>
where
    T: Resource<DynamicType = ()>,
{
    let gvk = GroupVersionKind::gvk(&T::group(&()), &T::version(&()), &T::kind(&()));

    match kube::discovery::pinned_kind(client, &gvk).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
        Err(kube::Error::Discovery(_)) => Ok(false),
        Err(error) => Err(error),
    }
}

/// Lists every pod the scheduler bound to `node_name`, straight from the api
/// server.
pub async fn list_node_pods(client: &Client, node_name: &str) -> Result<Vec<Pod>, kube::Error> {
    let pod_api: Api<Pod> = Api::all(client.clone());
    let list_params = ListParams::default().fields(&format!("spec.nodeName={node_name}"));

    debug!("Listing pods scheduled on '{node_name}'...");

    let pods = pod_api.list(&list_params).await?;

    Ok(pods.items)
}

/// Overwrites the whole object, relying on `resourceVersion` for
/// optimistic concurrency.
pub async fn replace_resource<T>(api: &Api<T>, resource: &T) -> Result<T, kube::Error>
where
    T: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let name = resource.meta().name.clone().unwrap_or_default();

    info!("Updating '{name}' {}...", pretty_type_name::<T>());

    api.replace(&name, &PostParams::default(), resource).await
}

/// Merge-patches the status subresource with `status`.
pub async fn patch_resource_status<T, S>(
    api: &Api<T>,
    name: &str,
    status: &S,
    patch_params: &PatchParams,
) -> Result<T, kube::Error>
where
    T: Clone + DeserializeOwned + Debug,
    S: Serialize + Debug,
{
    let patch = serde_json::json!({ "status": status });

    debug!(
        "Patching '{name}' {} status with {status:?}",
        pretty_type_name::<T>()
    );

    api.patch_status(name, patch_params, &Patch::Merge(&patch))
        .await
}
