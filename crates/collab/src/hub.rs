//! Registry of running diagram sessions (§4.H).
//!
//! One entry per diagram under active collaboration. Grounded on
//! `gateway/src/state.rs`'s use of a concurrent map for connection lookup,
//! generalized here to key by diagram rather than connection id.

use std::sync::Arc;

use dashmap::DashMap;
use tmi_common::{DiagramId, ThreatModelId, UserId};
use tmi_protocol::Cell;
use tracing::info;

use crate::auth::DiagramStore;
use crate::error::{ApiError, ApiResult};
use crate::session::{self, SessionHandle};

/// Shared registry of `diagram_id -> SessionHandle`. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    sessions: Arc<DashMap<DiagramId, SessionHandle>>,
    store: Arc<dyn DiagramStore>,
}

impl Hub {
    #[must_use]
    pub fn new(store: Arc<dyn DiagramStore>) -> Self {
        Self { sessions: Arc::new(DashMap::new()), store }
    }

    #[must_use]
    pub fn has_active_session(&self, diagram_id: DiagramId) -> bool {
        self.sessions.contains_key(&diagram_id)
    }

    #[must_use]
    pub fn get(&self, diagram_id: DiagramId) -> Option<SessionHandle> {
        self.sessions.get(&diagram_id).map(|entry| entry.clone())
    }

    /// Start a new session for `diagram_id`, rejecting if one is already
    /// running (§4.I: `POST .../collaborate` is create-only).
    pub async fn create_session(&self, diagram_id: DiagramId, host: UserId) -> ApiResult<SessionHandle> {
        if self.sessions.contains_key(&diagram_id) {
            return Err(ApiError::Conflict("a collaboration session is already active for this diagram".to_string()));
        }

        let snapshot = self.store.load_diagram(diagram_id).await?;
        let handle = self.spawn_and_register(diagram_id, snapshot.threat_model_id, host, snapshot.cells);
        Ok(handle)
    }

    /// Return the running session for `diagram_id`, or atomically create one
    /// if none exists yet (used by the WebSocket upgrade path — §4.I
    /// `GET .../ws` may be the first thing to touch a diagram).
    pub async fn get_or_create_session(&self, diagram_id: DiagramId, host: UserId) -> ApiResult<SessionHandle> {
        if let Some(handle) = self.get(diagram_id) {
            return Ok(handle);
        }

        let snapshot = self.store.load_diagram(diagram_id).await?;
        if let Some(handle) = self.get(diagram_id) {
            return Ok(handle);
        }
        let handle = self.spawn_and_register(diagram_id, snapshot.threat_model_id, host, snapshot.cells);
        Ok(handle)
    }

    fn spawn_and_register(
        &self,
        diagram_id: DiagramId,
        threat_model_id: ThreatModelId,
        host: UserId,
        cells: Vec<Cell>,
    ) -> SessionHandle {
        let handle = session::spawn(diagram_id, threat_model_id, host, cells, Arc::clone(&self.store));
        self.sessions.insert(diagram_id, handle.clone());
        info!(diagram_id = %diagram_id.as_uuid(), "collaboration session registered");
        handle
    }

    /// Stop the session for `diagram_id`, if any (§4.I `DELETE .../collaborate`,
    /// §4.G termination: removed from the registry before returning, so a
    /// subsequent lookup cannot observe it).
    pub async fn end_session(&self, diagram_id: DiagramId) -> ApiResult<()> {
        let Some((_, handle)) = self.sessions.remove(&diagram_id) else {
            return Err(ApiError::NotFound);
        };
        handle.terminate().await;
        info!(diagram_id = %diagram_id.as_uuid(), "collaboration session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DiagramSnapshot, Role};
    use async_trait::async_trait;

    struct EmptyStore;

    #[async_trait]
    impl DiagramStore for EmptyStore {
        async fn load_diagram(&self, _diagram_id: DiagramId) -> ApiResult<DiagramSnapshot> {
            Ok(DiagramSnapshot { threat_model_id: ThreatModelId::new(), cells: Vec::new() })
        }
        async fn persist_cells(&self, _diagram_id: DiagramId, _cells: &[Cell]) -> ApiResult<()> {
            Ok(())
        }
        async fn role_for(&self, _threat_model_id: ThreatModelId, _user_id: UserId) -> ApiResult<Role> {
            Ok(Role::Owner)
        }
    }

    #[tokio::test]
    async fn create_session_rejects_duplicate() {
        let hub = Hub::new(Arc::new(EmptyStore));
        let diagram_id = DiagramId::new();
        let host = UserId::new();

        hub.create_session(diagram_id, host).await.expect("first create succeeds");
        let err = hub.create_session(diagram_id, host).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn end_session_removes_from_registry() {
        let hub = Hub::new(Arc::new(EmptyStore));
        let diagram_id = DiagramId::new();
        hub.create_session(diagram_id, UserId::new()).await.unwrap();
        assert!(hub.has_active_session(diagram_id));

        hub.end_session(diagram_id).await.unwrap();
        assert!(!hub.has_active_session(diagram_id));
    }

    #[tokio::test]
    async fn end_session_not_found_for_unknown_diagram() {
        let hub = Hub::new(Arc::new(EmptyStore));
        let err = hub.end_session(DiagramId::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }
}
