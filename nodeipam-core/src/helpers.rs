use std::any::type_name;

use kube::Resource;

pub fn pretty_type_name<'a, T>() -> &'a str {
    type_name::<T>().rsplit("::").next().unwrap_or_default()
}

/// `namespace/name` as used in log lines, `name` for cluster-scoped objects
pub fn namespaced_key(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_owned(),
    }
}

pub trait RequireMetadata<E> {
    fn require_name_or(&self, error: E) -> Result<&str, E>;
    fn require_namespace_or(&self, error: E) -> Result<&str, E>;
}

impl<T: Resource, E> RequireMetadata<E> for T {
    fn require_name_or(&self, error: E) -> Result<&str, E> {
        Ok(self.meta().name.as_ref().ok_or(error)?.as_str())
    }

    fn require_namespace_or(&self, error: E) -> Result<&str, E> {
        Ok(self.meta().namespace.as_ref().ok_or(error)?.as_str())
    }
}

pub trait IsTombstoned {
    /// true once the api server has set a deletion timestamp on the object
    fn is_tombstoned(&self) -> bool;
}

impl<T: Resource> IsTombstoned for T {
    fn is_tombstoned(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}
