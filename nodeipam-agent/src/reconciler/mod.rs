use std::sync::Arc;

use kube::{runtime::controller::Action, Resource, ResourceExt};
use nodeipam_core::helpers::{namespaced_key, pretty_type_name};

use self::{context::ReconcilerContext, error::ReconcilerError};

pub mod context;
pub mod error;
pub mod multitenant;
pub mod nodenetworkconfig;

/// Requeues a failed object with its own exponential backoff.
pub fn reconcile_error_policy<K: Resource>(
    object: Arc<K>,
    _error: &ReconcilerError,
    context: Arc<ReconcilerContext>,
) -> Action {
    Action::requeue(context.backoff.next_delay(&backoff_key(object.as_ref())))
}

fn backoff_key<K: Resource>(object: &K) -> String {
    format!(
        "{}/{}",
        pretty_type_name::<K>(),
        namespaced_key(&object.name_any(), object.meta().namespace.as_deref())
    )
}
