//! Maps internal entity changes to subscriber invocations (§4.E).
//!
//! Grounded on the fan-out-with-filter shape of `gateway/src/broadcast.rs`:
//! one change produces an event, subscribers are looked up by a filter, and
//! each match gets its own dispatch rather than one shared broadcast.

use std::sync::Arc;

use tmi_common::{ThreatModelId, UserId};
use tmi_ratelimit::{Limit, Scope, ScopedCheck, SlidingWindowLimiter, check_fixed_order};
use tracing::warn;

use crate::dispatcher::DispatchHandle;
use crate::error::Result;
use crate::invocation::{Invocation, NewInvocation};
use crate::store::InvocationStore;
use crate::subscription::SubscriptionProvider;

#[cfg(feature = "metrics")]
use tmi_metrics::{counter, webhook};

const EVENTS_PER_MINUTE_LIMIT: Limit = Limit { requests: 120, window_secs: 60 };

#[derive(Debug, Clone)]
pub struct EntityEvent {
    pub event_type: String,
    pub threat_model_id: ThreatModelId,
    pub resource_id: String,
    pub resource_type: String,
    pub owner_id: UserId,
    pub data: serde_json::Value,
}

pub struct EventEmitter {
    store: InvocationStore,
    subscriptions: Arc<dyn SubscriptionProvider>,
    limiter: SlidingWindowLimiter,
    dispatch: DispatchHandle,
}

impl EventEmitter {
    #[must_use]
    pub fn new(
        store: InvocationStore,
        subscriptions: Arc<dyn SubscriptionProvider>,
        limiter: SlidingWindowLimiter,
        dispatch: DispatchHandle,
    ) -> Self {
        Self { store, subscriptions, limiter, dispatch }
    }

    /// Emit an entity-change event: look up prefix-matching subscribers,
    /// apply the owner's event-rate limit, and enqueue one invocation per
    /// surviving match.
    pub async fn emit(&mut self, event: EntityEvent) -> Result<()> {
        let decision = check_fixed_order(
            &mut self.limiter,
            &[ScopedCheck {
                scope: Scope::WebhookEventsPerMinute,
                key: &event.owner_id.as_uuid().to_string(),
                limit: EVENTS_PER_MINUTE_LIMIT,
            }],
        )
        .await;
        if !decision.allowed {
            warn!(owner_id = %event.owner_id.as_uuid(), "event rate limit exceeded, dropping event");
            return Ok(());
        }

        let subscribers = self.subscriptions.subscribers_for_event(&event.event_type).await?;
        for subscriber in subscribers {
            let invocation = Invocation::new(
                NewInvocation {
                    addon_id: subscriber.id.clone(),
                    threat_model_id: event.threat_model_id,
                    object_type: Some(event.resource_type.clone()),
                    object_id: Some(event.resource_id.clone()),
                    invoked_by_uuid: event.owner_id,
                    invoked_by_id: event.owner_id.as_uuid().to_string(),
                    invoked_by_email: None,
                    invoked_by_name: None,
                    payload: serde_json::json!({
                        "event_type": event.event_type,
                        "data": event.data,
                    }),
                },
                chrono::Utc::now(),
            )?;

            self.store.insert(&invocation).await?;
            self.dispatch.enqueue(invocation.id).await;
            #[cfg(feature = "metrics")]
            counter!(webhook::INVOCATIONS_CREATED_TOTAL).increment(1);
        }

        Ok(())
    }
}

/// Event-type prefix match: a subscription for `"threat_model"` receives
/// `"threat_model.created"`, `"threat_model.updated"`, etc.
#[must_use]
pub fn matches_event_type(subscription_event_types: &[String], event_type: &str) -> bool {
    subscription_event_types.iter().any(|prefix| event_type.starts_with(prefix.as_str()))
}
