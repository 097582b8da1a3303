//! Periodic subscription-deletion cascade sweep (§4.D "Cascade on
//! subscription deletion").
//!
//! Same timer-loop shape as `reaper.rs`: a single `tokio::time::interval`
//! tick that asks the provider which addons are pending deletion and drives
//! `delete_cascade` for each. A failed cascade aborts only that addon's
//! sweep iteration; the rest of the batch still runs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::subscription::SubscriptionProvider;

const SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Run forever, sweeping for subscriptions pending deletion every
/// [`SCAN_INTERVAL`] and cascading each through `delete_cascade`.
pub async fn run(subscriptions: Arc<dyn SubscriptionProvider>) {
    let mut ticker = tokio::time::interval(SCAN_INTERVAL);
    loop {
        ticker.tick().await;
        sweep_once(subscriptions.as_ref()).await;
    }
}

async fn sweep_once(subscriptions: &dyn SubscriptionProvider) {
    let pending = match subscriptions.pending_deletion().await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(%err, "failed to list subscriptions pending deletion");
            return;
        }
    };
    if pending.is_empty() {
        return;
    }
    info!(count = pending.len(), "cascading deletion for pending subscriptions");

    for addon_id in pending {
        if let Err(err) = subscriptions.delete_cascade(&addon_id).await {
            warn!(addon_id, %err, "subscription delete cascade failed, will retry next sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscription;
    use crate::test_support::FakeSubscriptions;

    fn subscription(id: &str, pending_delete: bool) -> Subscription {
        Subscription {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            url: "https://example.invalid/hook".to_string(),
            secret: "shh".to_string(),
            event_types: vec![],
            broken: false,
            consecutive_failures: 0,
            pending_delete,
        }
    }

    #[tokio::test]
    async fn sweep_cascades_only_subscriptions_pending_deletion() {
        let subs = FakeSubscriptions::default();
        subs.insert(subscription("addon-keep", false));
        subs.insert(subscription("addon-drop", true));

        sweep_once(&subs).await;

        assert_eq!(subs.cascaded.lock().unwrap().as_slice(), ["addon-drop"]);
        assert!(subs.get("addon-keep").await.unwrap().is_some());
        assert!(subs.get("addon-drop").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_is_a_noop_when_nothing_is_pending() {
        let subs = FakeSubscriptions::default();
        subs.insert(subscription("addon-keep", false));

        sweep_once(&subs).await;

        assert!(subs.cascaded.lock().unwrap().is_empty());
    }
}
