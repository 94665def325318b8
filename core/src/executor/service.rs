//! Endpoint service loop

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventCode, EventsLogger};
use crate::traits::Endpoint;

use super::stats::ExecutorStats;

/// Repeatedly service `endpoint` until `shutdown` is cancelled
///
/// Errors are logged and the loop continues; a fatal error ends this loop
/// only. Cancellation is checked first, so no new callback starts after it.
pub async fn service_loop(
    node: String,
    endpoint: Arc<dyn Endpoint>,
    shutdown: CancellationToken,
    events: Option<Arc<EventsLogger>>,
) -> ExecutorStats {
    let mut stats = ExecutorStats::new();
    stats.start();

    let info = endpoint.info().clone();
    tracing::debug!(node = %node, kind = %info.kind, channel = %info.channel, "Endpoint loop started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                break;
            }

            result = endpoint.service() => {
                match result {
                    Ok(notice) => {
                        stats.record_callback();
                        if let (Some(notice), Some(events)) = (notice, &events) {
                            events.log(Event::new(&node, notice.code, notice.description));
                        }
                    }
                    Err(e) => {
                        stats.record_error();
                        tracing::warn!(
                            node = %node,
                            channel = %info.channel,
                            error = %e,
                            "Endpoint callback failed"
                        );
                        if let Some(events) = &events {
                            events.log(Event::new(
                                &node,
                                EventCode::CallbackError,
                                format!("{} '{}': {}", info.kind, info.channel, e),
                            ));
                        }
                        if e.is_fatal() {
                            stats.stopped_endpoints += 1;
                            break;
                        }
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
    }

    stats.stop();
    tracing::debug!(
        node = %node,
        channel = %info.channel,
        callbacks = stats.callbacks,
        errors = stats.errors,
        "Endpoint loop finished"
    );
    stats
}
