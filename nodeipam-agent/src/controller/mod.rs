use std::{future::Future, pin::pin, time::Duration};

use log::warn;
use tokio_util::sync::CancellationToken;

pub mod multitenant;
pub mod nodenetworkconfig;

pub const AGENT_FIELD_MANAGER: &str = "nodeipam-agent";

/// How long a controller may keep draining after cancellation before it is
/// dropped.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Drives `controller` to completion, but gives up on it once `shutdown` has
/// been cancelled for longer than `grace`. A controller whose store never
/// synced doesn't react to graceful shutdown at all.
pub(crate) async fn run_until_shutdown<F>(
    name: &str,
    controller: F,
    shutdown: &CancellationToken,
    grace: Duration,
) where
    F: Future<Output = ()>,
{
    let mut controller = pin!(controller);

    tokio::select! {
        _ = &mut controller => return,
        _ = shutdown.cancelled() => {}
    }

    if tokio::time::timeout(grace, controller).await.is_err() {
        warn!("{name} controller didn't stop within {grace:?}, dropping it");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn stuck_controller_is_dropped_after_grace() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(
            Duration::from_secs(5),
            run_until_shutdown(
                "stuck",
                futures::future::pending(),
                &shutdown,
                Duration::from_millis(50),
            ),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn draining_controller_finishes_within_grace() {
        let shutdown = CancellationToken::new();
        let drained = Arc::new(AtomicBool::new(false));
        let controller = {
            let shutdown = shutdown.clone();
            let drained = drained.clone();
            async move {
                shutdown.cancelled().await;
                drained.store(true, Ordering::SeqCst);
            }
        };
        shutdown.cancel();

        run_until_shutdown("draining", controller, &shutdown, Duration::from_secs(5)).await;

        assert!(drained.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn finished_controller_returns_without_cancellation() {
        let shutdown = CancellationToken::new();

        run_until_shutdown("done", async {}, &shutdown, Duration::from_secs(5)).await;

        assert!(!shutdown.is_cancelled());
    }
}
