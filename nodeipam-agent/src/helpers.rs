use std::{fmt::Debug, process::exit};

use kube::{
    runtime::{
        controller::{Action, Error as ControllerError},
        reflector::ObjectRef,
        watcher::Error as WatcherError,
    },
    Resource,
};
use log::{error, info, warn};
use nodeipam_core::{helpers::pretty_type_name, kubernetes::is_not_found};

/// Exit code used when the cluster can't serve the agent's custom resources.
pub const EXIT_MISCONFIGURED: i32 = 1;

/// Logs a controller result. A watcher that can't list its resource type
/// because the CRD is missing ends the process.
pub fn handle_reconciliation_result<T, E>(
    result: Result<(ObjectRef<T>, Action), ControllerError<E, WatcherError>>,
) -> impl std::future::Future<Output = ()>
where
    T: Resource,
    E: Debug,
{
    let resource_name = pretty_type_name::<T>();

    match result {
        Ok(result) => info!(
            "Reconciled {} '{}' in '{}' namespace. Next action: {:?}",
            resource_name.to_lowercase(),
            result.0.name,
            result.0.namespace.as_deref().unwrap_or("---"),
            result.1
        ),
        Err(err) => match err {
            ControllerError::ObjectNotFound(_) => (), // gone before we got to it, nothing to do
            ControllerError::ReconcilerFailed(reconciler_error, with_obj) => {
                warn!(
                    "{} reconciliation failed for '{}' (namespace {}): {:#?}",
                    resource_name,
                    with_obj.name,
                    with_obj.namespace.as_deref().unwrap_or("---"),
                    reconciler_error
                )
            }
            ControllerError::QueueError(watcher_err)
                if is_resource_type_undefined(&watcher_err) =>
            {
                error!(
                    "{resource_name} custom resource is not defined on the cluster! \
                     {watcher_err:#?}"
                );
                exit(EXIT_MISCONFIGURED)
            }
            ControllerError::QueueError(watcher_err) => {
                error!("{resource_name} watcher has failed! {watcher_err:#?}")
            }
            #[allow(unreachable_patterns)]
            other => error!("{resource_name} controller has failed! {other:#?}"),
        },
    }

    std::future::ready(())
}

/// A 404 on the initial list or watch means the type itself is unknown.
pub fn is_resource_type_undefined(error: &WatcherError) -> bool {
    match error {
        WatcherError::InitialListFailed(error) | WatcherError::WatchStartFailed(error) => {
            is_not_found(error)
        }
        _ => false,
    }
}
