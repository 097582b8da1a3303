//! External collaborator seam for add-on subscription storage (§1, §4.D).
//!
//! Subscriptions (URL, secret, retry policy, failure stats) and the add-ons
//! dependent on them live outside this core's data model; a host wires in a
//! concrete `SubscriptionProvider` backed by its own database.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub owner_id: String,
    pub url: String,
    pub secret: String,
    pub event_types: Vec<String>,
    pub broken: bool,
    pub consecutive_failures: u32,
    /// Flagged by the owning host for deletion; the cascade sweep discovers
    /// these via `pending_deletion` and drains them through `delete_cascade`.
    pub pending_delete: bool,
}

#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn get(&self, addon_id: &str) -> Result<Option<Subscription>>;

    async fn subscribers_for_event(&self, event_type: &str) -> Result<Vec<Subscription>>;

    async fn record_failure(&self, addon_id: &str) -> Result<()>;

    async fn record_success(&self, addon_id: &str) -> Result<()>;

    async fn mark_broken(&self, addon_id: &str) -> Result<()>;

    /// Addon ids currently flagged `pending_delete`, polled by the cascade
    /// sweep (§4.D).
    async fn pending_deletion(&self) -> Result<Vec<String>>;

    /// Delete a subscription and everything that depends on it, in the
    /// order §4.D requires: delivery records, then dependent add-ons, then
    /// the subscription itself. Any sub-step failure aborts the cascade.
    async fn delete_cascade(&self, addon_id: &str) -> Result<()>;
}
