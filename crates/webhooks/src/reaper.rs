//! Periodic invocation-staleness reaper (§4.B, §5).
//!
//! Folded in from the timer-loop shape the deleted agent-scheduling crate
//! used for its own heartbeat: a single `tokio::time::interval` tick that
//! scans and marks, rather than a per-invocation expiry timer.

use std::time::Duration;

use tracing::{info, warn};

#[cfg(feature = "metrics")]
use tmi_metrics::{counter, webhook};

use crate::invocation::InvocationStatus;
use crate::store::InvocationStore;

const SCAN_INTERVAL: Duration = Duration::from_secs(60);
const TIMEOUT_REASON: &str = "timeout";

/// Run forever, scanning for stale invocations every [`SCAN_INTERVAL`] and
/// transitioning each to `Failed`. Intended to be spawned as its own task.
pub async fn run(mut store: InvocationStore) {
    let mut ticker = tokio::time::interval(SCAN_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(err) = reap_once(&mut store).await {
            warn!(%err, "staleness reaper scan failed");
        }
    }
}

async fn reap_once(store: &mut InvocationStore) -> crate::error::Result<()> {
    let stale = store.list_stale().await?;
    if stale.is_empty() {
        return Ok(());
    }
    info!(count = stale.len(), "reaping stale invocations");

    for invocation in stale {
        let result = store
            .update_status(
                invocation.id,
                InvocationStatus::Failed,
                invocation.status_percent,
                Some(TIMEOUT_REASON.to_string()),
            )
            .await;
        if let Err(err) = result {
            warn!(invocation_id = %invocation.id.as_uuid(), %err, "failed to reap stale invocation");
        } else {
            #[cfg(feature = "metrics")]
            counter!(webhook::INVOCATIONS_REAPED_TOTAL).increment(1);
        }
    }
    Ok(())
}
