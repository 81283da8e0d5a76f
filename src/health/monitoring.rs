//! Supervision loop behind `enable_auto_restart`.
//!
//! One task per container: probe, store the result, restart when unhealthy,
//! then sleep for the interval or until cancelled. The loop ends when its
//! token is cancelled, when its record is removed or handed to a newer loop,
//! or when a restart fails.

use super::{HealthEndpoint, Inner};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

enum Cycle {
    Continue,
    Stop,
}

pub(super) async fn run_supervision(
    inner: Arc<Inner>,
    container: String,
    generation: u64,
    token: CancellationToken,
) {
    tracing::debug!("Supervision loop {} started for {}", generation, container);

    loop {
        if token.is_cancelled() {
            break;
        }
        let Some((endpoint, interval)) = inner.supervision_target(&container, generation) else {
            break;
        };

        let cycle = AssertUnwindSafe(supervise_once(&inner, &container, generation, &endpoint))
            .catch_unwind()
            .await;
        match cycle {
            Ok(Cycle::Continue) => {}
            Ok(Cycle::Stop) => break,
            Err(panic_info) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                tracing::error!(
                    "Health cycle for {} panicked: {}. Continuing supervision...",
                    container,
                    panic_msg
                );
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::debug!("Supervision loop {} for {} stopped", generation, container);
}

async fn supervise_once(
    inner: &Inner,
    container: &str,
    generation: u64,
    endpoint: &HealthEndpoint,
) -> Cycle {
    let healthy = inner.probe(endpoint).await;
    if inner.record_result(container, healthy, Some(generation)).is_none() {
        // removed or superseded while probing
        return Cycle::Stop;
    }
    if healthy {
        return Cycle::Continue;
    }

    tracing::info!("Restarting unhealthy container {}", container);
    match inner.runtime.restart(container).await {
        Ok(()) => {
            inner.note_restart(container, generation);
            Cycle::Continue
        }
        Err(e) => {
            tracing::error!(
                "Restart of {} failed, stopping auto-restart: {}",
                container,
                e
            );
            inner.abandon(container, generation);
            Cycle::Stop
        }
    }
}
