//! In-memory `SubscriptionProvider` fake shared by this crate's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::subscription::{Subscription, SubscriptionProvider};

#[derive(Default)]
pub struct FakeSubscriptions {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    pub recorded_failures: Mutex<Vec<String>>,
    pub recorded_successes: Mutex<Vec<String>>,
    pub broken: Mutex<Vec<String>>,
    pub cascaded: Mutex<Vec<String>>,
}

impl FakeSubscriptions {
    pub fn insert(&self, sub: Subscription) {
        #[allow(clippy::unwrap_used)]
        self.subscriptions.lock().unwrap().insert(sub.id.clone(), sub);
    }
}

#[async_trait]
impl SubscriptionProvider for FakeSubscriptions {
    async fn get(&self, addon_id: &str) -> Result<Option<Subscription>> {
        #[allow(clippy::unwrap_used)]
        Ok(self.subscriptions.lock().unwrap().get(addon_id).cloned())
    }

    async fn subscribers_for_event(&self, event_type: &str) -> Result<Vec<Subscription>> {
        #[allow(clippy::unwrap_used)]
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.event_types.iter().any(|e| e == event_type))
            .cloned()
            .collect())
    }

    async fn record_failure(&self, addon_id: &str) -> Result<()> {
        #[allow(clippy::unwrap_used)]
        self.recorded_failures.lock().unwrap().push(addon_id.to_string());
        Ok(())
    }

    async fn record_success(&self, addon_id: &str) -> Result<()> {
        #[allow(clippy::unwrap_used)]
        self.recorded_successes.lock().unwrap().push(addon_id.to_string());
        Ok(())
    }

    async fn mark_broken(&self, addon_id: &str) -> Result<()> {
        #[allow(clippy::unwrap_used)]
        self.broken.lock().unwrap().push(addon_id.to_string());
        Ok(())
    }

    async fn pending_deletion(&self) -> Result<Vec<String>> {
        #[allow(clippy::unwrap_used)]
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.pending_delete)
            .map(|s| s.id.clone())
            .collect())
    }

    async fn delete_cascade(&self, addon_id: &str) -> Result<()> {
        #[allow(clippy::unwrap_used)]
        {
            self.cascaded.lock().unwrap().push(addon_id.to_string());
            self.subscriptions.lock().unwrap().remove(addon_id);
        }
        Ok(())
    }
}
