//! Default external-collaborator implementations (§1 "External
//! collaborators"): the REST CRUD store, the administrator check, and the
//! subscription registry are all explicitly out of scope for the core and
//! owned by a host service in a real deployment.
//!
//! Grounded on the teacher's `service-traits` crate: "Each trait has a
//! `Noop` implementation that returns empty/default responses, allowing the
//! gateway to run standalone before domain crates are wired in." These
//! in-memory stand-ins let `tmi-collab-server` boot and serve traffic
//! without a real threat-modeling backend; a production deployment replaces
//! them with its own `DiagramStore`/`SubscriptionProvider`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tmi_collab::auth::{DiagramSnapshot, DiagramStore, Role};
use tmi_common::{DiagramId, ThreatModelId, UserId};
use tmi_protocol::Cell;
use tmi_webhooks::{Result as WebhookResult, Subscription, SubscriptionProvider};
use tracing::warn;

/// Holds diagram cell state purely in memory; every caller is granted
/// `Owner`. A host backed by the real REST CRUD collaborator replaces this.
#[derive(Default)]
pub struct InMemoryDiagramStore {
    diagrams: Mutex<HashMap<DiagramId, (ThreatModelId, Vec<Cell>)>>,
}

#[async_trait]
impl DiagramStore for InMemoryDiagramStore {
    async fn load_diagram(&self, diagram_id: DiagramId) -> tmi_collab::ApiResult<DiagramSnapshot> {
        #[allow(clippy::unwrap_used)]
        let mut diagrams = self.diagrams.lock().unwrap();
        let (threat_model_id, cells) = diagrams
            .entry(diagram_id)
            .or_insert_with(|| (ThreatModelId::new(), Vec::new()))
            .clone();
        Ok(DiagramSnapshot { threat_model_id, cells })
    }

    async fn persist_cells(&self, diagram_id: DiagramId, cells: &[Cell]) -> tmi_collab::ApiResult<()> {
        #[allow(clippy::unwrap_used)]
        let mut diagrams = self.diagrams.lock().unwrap();
        let entry = diagrams.entry(diagram_id).or_insert_with(|| (ThreatModelId::new(), Vec::new()));
        entry.1 = cells.to_vec();
        Ok(())
    }

    async fn role_for(&self, _threat_model_id: ThreatModelId, _user_id: UserId) -> tmi_collab::ApiResult<Role> {
        warn!("no DiagramStore configured, granting Owner to every caller");
        Ok(Role::Owner)
    }
}

/// No subscriptions registered; webhook dispatch is a no-op until a host
/// wires in a real `SubscriptionProvider`.
#[derive(Default)]
pub struct NoSubscriptions;

#[async_trait]
impl SubscriptionProvider for NoSubscriptions {
    async fn get(&self, _addon_id: &str) -> WebhookResult<Option<Subscription>> {
        Ok(None)
    }

    async fn subscribers_for_event(&self, _event_type: &str) -> WebhookResult<Vec<Subscription>> {
        Ok(Vec::new())
    }

    async fn record_failure(&self, _addon_id: &str) -> WebhookResult<()> {
        Ok(())
    }

    async fn record_success(&self, _addon_id: &str) -> WebhookResult<()> {
        Ok(())
    }

    async fn mark_broken(&self, _addon_id: &str) -> WebhookResult<()> {
        Ok(())
    }

    async fn pending_deletion(&self) -> WebhookResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete_cascade(&self, _addon_id: &str) -> WebhookResult<()> {
        Ok(())
    }
}
