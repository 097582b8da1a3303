//! Bounded-queue worker pool for outbound webhook delivery (§4.D).
//!
//! Grounded on the read/write task split in `gateway/src/ws.rs`: a shared
//! channel feeds a fixed pool of workers rather than spawning one task per
//! invocation, bounding how much outbound HTTP runs concurrently.

use std::sync::Arc;
use std::time::Duration;

use tmi_common::InvocationId;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

#[cfg(feature = "metrics")]
use tmi_metrics::{counter, histogram, webhook, labels};

use crate::hmac::{self, SIGNATURE_HEADER};
use crate::invocation::{Invocation, InvocationStatus};
use crate::store::InvocationStore;
use crate::subscription::SubscriptionProvider;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
const BROKEN_FAILURE_THRESHOLD: u32 = 10;

pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { queue_capacity: 1024, worker_count: 4 }
    }
}

#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<InvocationId>,
}

impl DispatchHandle {
    pub async fn enqueue(&self, id: InvocationId) {
        if self.tx.send(id).await.is_err() {
            warn!(invocation_id = %id.as_uuid(), "dispatcher queue closed, dropping invocation");
        }
    }

    pub fn try_enqueue(&self, id: InvocationId) -> bool {
        self.tx.try_send(id).is_ok()
    }
}

/// Spawn the worker pool and return a handle producers can enqueue through.
pub fn spawn(
    config: DispatcherConfig,
    store: InvocationStore,
    subscriptions: Arc<dyn SubscriptionProvider>,
    http: reqwest::Client,
) -> DispatchHandle {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..config.worker_count {
        let rx = Arc::clone(&rx);
        let mut store = store.clone();
        let subscriptions = Arc::clone(&subscriptions);
        let http = http.clone();

        tokio::spawn(async move {
            loop {
                let id = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(id) = id else {
                    info!(worker_id, "dispatcher worker shutting down, queue closed");
                    break;
                };
                deliver_one(&mut store, subscriptions.as_ref(), &http, id).await;
            }
        });
    }

    DispatchHandle { tx }
}

async fn deliver_one(
    store: &mut InvocationStore,
    subscriptions: &dyn SubscriptionProvider,
    http: &reqwest::Client,
    id: InvocationId,
) {
    let invocation = match store.get(id).await {
        Ok(inv) => inv,
        Err(err) => {
            warn!(invocation_id = %id.as_uuid(), %err, "failed to load invocation for delivery");
            return;
        }
    };
    if invocation.status.is_terminal() {
        return;
    }

    let subscription = match subscriptions.get(&invocation.addon_id).await {
        Ok(Some(sub)) if !sub.broken => sub,
        Ok(_) => {
            warn!(addon_id = %invocation.addon_id, "no usable subscription, dropping delivery");
            return;
        }
        Err(err) => {
            warn!(addon_id = %invocation.addon_id, %err, "failed to load subscription");
            return;
        }
    };

    let Ok(raw_body) = delivery_body(&invocation) else {
        warn!(invocation_id = %id.as_uuid(), "failed to encode delivery body");
        return;
    };
    let signature = hmac::sign(&subscription.secret, &raw_body);

    let response = http
        .post(&subscription.url)
        .header(SIGNATURE_HEADER, signature)
        .header("content-type", "application/json")
        .timeout(DELIVERY_TIMEOUT)
        .body(raw_body)
        .send()
        .await;

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    match response {
        Ok(resp) if resp.status().is_success() => {
            #[cfg(feature = "metrics")]
            {
                histogram!(webhook::DELIVERY_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
                counter!(webhook::INVOCATIONS_COMPLETED_TOTAL, labels::OUTCOME => "succeeded").increment(1);
            }
            if let Err(err) = subscriptions.record_success(&invocation.addon_id).await {
                warn!(addon_id = %invocation.addon_id, %err, "failed to record delivery success");
            }
        }
        Ok(resp) => {
            #[cfg(feature = "metrics")]
            counter!(webhook::INVOCATIONS_COMPLETED_TOTAL, labels::OUTCOME => "failed").increment(1);
            warn!(addon_id = %invocation.addon_id, status = %resp.status(), "webhook delivery rejected");
            mark_failure(subscriptions, &invocation.addon_id, &subscription).await;
        }
        Err(err) => {
            #[cfg(feature = "metrics")]
            counter!(webhook::INVOCATIONS_COMPLETED_TOTAL, labels::OUTCOME => "failed").increment(1);
            warn!(addon_id = %invocation.addon_id, %err, "webhook delivery failed");
            mark_failure(subscriptions, &invocation.addon_id, &subscription).await;
        }
    }
}

/// The JSON body POSTed to a subscription's webhook URL, split out from
/// `deliver_one` so it's testable without a store or an HTTP client.
fn delivery_body(invocation: &Invocation) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&serde_json::json!({
        "invocation_id": invocation.id.as_uuid(),
        "addon_id": invocation.addon_id,
        "threat_model_id": invocation.threat_model_id.as_uuid(),
        "object_type": invocation.object_type,
        "object_id": invocation.object_id,
        "invoked_by": {
            "uuid": invocation.invoked_by_uuid.as_uuid(),
            "id": invocation.invoked_by_id,
            "email": invocation.invoked_by_email,
            "name": invocation.invoked_by_name,
        },
        "payload": invocation.payload,
    }))
}

async fn mark_failure(
    subscriptions: &dyn SubscriptionProvider,
    addon_id: &str,
    subscription: &crate::subscription::Subscription,
) {
    if let Err(err) = subscriptions.record_failure(addon_id).await {
        warn!(addon_id, %err, "failed to record delivery failure");
        return;
    }
    if subscription.consecutive_failures + 1 >= BROKEN_FAILURE_THRESHOLD {
        if let Err(err) = subscriptions.mark_broken(addon_id).await {
            warn!(addon_id, %err, "failed to mark subscription broken");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tmi_common::{ThreatModelId, UserId};

    use super::*;
    use crate::invocation::NewInvocation;
    use crate::subscription::Subscription;
    use crate::test_support::FakeSubscriptions;

    fn subscription(consecutive_failures: u32) -> Subscription {
        Subscription {
            id: "addon-1".to_string(),
            owner_id: "owner-1".to_string(),
            url: "https://example.invalid/hook".to_string(),
            secret: "shh".to_string(),
            event_types: vec!["diagram.updated".to_string()],
            broken: false,
            consecutive_failures,
            pending_delete: false,
        }
    }

    fn invocation() -> Invocation {
        Invocation::new(
            NewInvocation {
                addon_id: "addon-1".to_string(),
                threat_model_id: ThreatModelId::new(),
                object_type: None,
                object_id: None,
                invoked_by_uuid: UserId::new(),
                invoked_by_id: "u1".to_string(),
                invoked_by_email: None,
                invoked_by_name: None,
                payload: serde_json::json!({"k": "v"}),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn delivery_body_carries_invocation_identity_and_payload() {
        let inv = invocation();
        let raw = delivery_body(&inv).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed["addon_id"], "addon-1");
        assert_eq!(parsed["payload"]["k"], "v");
    }

    #[tokio::test]
    async fn mark_failure_records_failure_without_marking_broken_below_threshold() {
        let subs = FakeSubscriptions::default();
        mark_failure(&subs, "addon-1", &subscription(0)).await;
        assert_eq!(subs.recorded_failures.lock().unwrap().as_slice(), ["addon-1"]);
        assert!(subs.broken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_failure_marks_broken_at_threshold() {
        let subs = FakeSubscriptions::default();
        mark_failure(&subs, "addon-1", &subscription(BROKEN_FAILURE_THRESHOLD - 1)).await;
        assert_eq!(subs.broken.lock().unwrap().as_slice(), ["addon-1"]);
    }
}

/// Apply an HMAC-verified inbound status update from the external callee.
/// Rejects transitions other than to `InProgress`/`Completed`/`Failed`.
pub async fn apply_inbound_status_update(
    store: &mut InvocationStore,
    id: InvocationId,
    status: InvocationStatus,
    status_percent: i32,
    status_message: Option<String>,
) -> crate::error::Result<()> {
    store.update_status(id, status, status_percent, status_message).await?;
    Ok(())
}
