//! End-to-end coverage of the session pipeline through the public API:
//! join, authorize, apply, broadcast, and role-gated denial (§4.G), plus
//! the hub's create/end lifecycle (§4.H/§4.I) — all driven without Redis
//! or HTTP, since `Hub`/`SessionHandle` only need a `DiagramStore`.

use std::sync::Arc;

use async_trait::async_trait;
use tmi_collab::auth::{DiagramSnapshot, DiagramStore, Role};
use tmi_collab::error::ApiError;
use tmi_collab::hub::Hub;
use tmi_common::{DiagramId, ThreatModelId, UserId};
use tmi_protocol::{Cell, CellData, CellOperation, CellOperationKind, Message};

struct MemoryStore;

#[async_trait]
impl DiagramStore for MemoryStore {
    async fn load_diagram(&self, _diagram_id: DiagramId) -> Result<DiagramSnapshot, ApiError> {
        Ok(DiagramSnapshot { threat_model_id: ThreatModelId::new(), cells: Vec::new() })
    }

    async fn persist_cells(&self, _diagram_id: DiagramId, _cells: &[Cell]) -> Result<(), ApiError> {
        Ok(())
    }

    async fn role_for(&self, _threat_model_id: ThreatModelId, _user_id: UserId) -> Result<Role, ApiError> {
        Ok(Role::Owner)
    }
}

fn add_cell_op() -> CellOperation {
    let id = uuid::Uuid::new_v4();
    CellOperation {
        id,
        operation: CellOperationKind::Add,
        data: Some(Cell { id, data: CellData::Node { fields: serde_json::Map::new() } }),
    }
}

async fn recv_message(rx: &mut tokio::sync::mpsc::Receiver<String>) -> Message {
    let raw = rx.recv().await.expect("expected a message");
    serde_json::from_str(&raw).expect("message should deserialize")
}

#[tokio::test]
async fn writer_operation_is_applied_and_broadcast_to_all_participants() {
    let hub = Hub::new(Arc::new(MemoryStore));
    let diagram_id = DiagramId::new();
    let host = UserId::new();
    let handle = hub.create_session(diagram_id, host).await.unwrap();

    let mut host_rx = handle
        .join("host-conn".to_string(), host, Some("idp:host".to_string()), None, None, Role::Owner)
        .await
        .unwrap();
    // initial sync, then a participants update for the host's own join
    assert!(matches!(recv_message(&mut host_rx).await, Message::DiagramStateSync(_)));
    assert!(matches!(recv_message(&mut host_rx).await, Message::ParticipantsUpdate(_)));

    let writer = UserId::new();
    let mut writer_rx = handle
        .join("writer-conn".to_string(), writer, Some("idp:writer".to_string()), None, None, Role::Writer)
        .await
        .unwrap();
    assert!(matches!(recv_message(&mut writer_rx).await, Message::DiagramStateSync(_)));
    // both participants observe the writer joining via a participants update
    assert!(matches!(recv_message(&mut host_rx).await, Message::ParticipantsUpdate(_)));
    assert!(matches!(recv_message(&mut writer_rx).await, Message::ParticipantsUpdate(_)));

    let request = Message::DiagramOperationRequest(tmi_protocol::DiagramOperationRequest {
        diagram_id,
        operations: vec![add_cell_op()],
        sequence_number: None,
    });
    handle.inbound("writer-conn".to_string(), serde_json::to_string(&request).unwrap()).await;

    let host_event = recv_message(&mut host_rx).await;
    let Message::DiagramOperationEvent(event) = host_event else { panic!("expected an operation event") };
    assert_eq!(event.sequence_number, 1);
    assert_eq!(event.initiating_user.user_id, writer);

    let writer_event = recv_message(&mut writer_rx).await;
    assert!(matches!(writer_event, Message::DiagramOperationEvent(_)));
}

#[tokio::test]
async fn reader_operation_request_is_denied() {
    let hub = Hub::new(Arc::new(MemoryStore));
    let diagram_id = DiagramId::new();
    let host = UserId::new();
    let handle = hub.create_session(diagram_id, host).await.unwrap();

    let reader = UserId::new();
    let mut reader_rx = handle
        .join("reader-conn".to_string(), reader, Some("idp:reader".to_string()), None, None, Role::Reader)
        .await
        .unwrap();
    assert!(matches!(recv_message(&mut reader_rx).await, Message::DiagramStateSync(_)));

    let request = Message::DiagramOperationRequest(tmi_protocol::DiagramOperationRequest {
        diagram_id,
        operations: vec![add_cell_op()],
        sequence_number: None,
    });
    handle.inbound("reader-conn".to_string(), serde_json::to_string(&request).unwrap()).await;

    let reply = recv_message(&mut reader_rx).await;
    match reply {
        Message::Error(err) => assert_eq!(err.code, "permission_denied"),
        other => panic!("expected a permission_denied error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_host_cannot_change_presenter() {
    let hub = Hub::new(Arc::new(MemoryStore));
    let diagram_id = DiagramId::new();
    let host = UserId::new();
    let handle = hub.create_session(diagram_id, host).await.unwrap();

    let writer = UserId::new();
    let mut writer_rx = handle
        .join("writer-conn".to_string(), writer, Some("idp:writer".to_string()), None, None, Role::Writer)
        .await
        .unwrap();
    assert!(matches!(recv_message(&mut writer_rx).await, Message::DiagramStateSync(_)));

    let request = Message::ChangePresenterRequest(tmi_protocol::ChangePresenterRequest {
        diagram_id,
        new_presenter: writer,
    });
    handle.inbound("writer-conn".to_string(), serde_json::to_string(&request).unwrap()).await;

    let reply = recv_message(&mut writer_rx).await;
    match reply {
        Message::Error(err) => assert_eq!(err.code, "permission_denied"),
        other => panic!("expected a permission_denied error, got {other:?}"),
    }
}

#[tokio::test]
async fn presenter_cursor_from_non_presenter_is_not_broadcast() {
    let hub = Hub::new(Arc::new(MemoryStore));
    let diagram_id = DiagramId::new();
    let host = UserId::new();
    let handle = hub.create_session(diagram_id, host).await.unwrap();

    let mut host_rx = handle
        .join("host-conn".to_string(), host, Some("idp:host".to_string()), None, None, Role::Owner)
        .await
        .unwrap();
    assert!(matches!(recv_message(&mut host_rx).await, Message::DiagramStateSync(_)));
    assert!(matches!(recv_message(&mut host_rx).await, Message::ParticipantsUpdate(_)));

    let bystander = UserId::new();
    let mut bystander_rx = handle
        .join("bystander-conn".to_string(), bystander, Some("idp:bystander".to_string()), None, None, Role::Writer)
        .await
        .unwrap();
    assert!(matches!(recv_message(&mut bystander_rx).await, Message::DiagramStateSync(_)));
    assert!(matches!(recv_message(&mut host_rx).await, Message::ParticipantsUpdate(_)));
    assert!(matches!(recv_message(&mut bystander_rx).await, Message::ParticipantsUpdate(_)));

    // host is the current presenter by default; the bystander is not, so its
    // cursor message is rejected back to itself and never fanned out.
    let cursor = Message::PresenterCursor(tmi_protocol::PresenterCursor {
        diagram_id,
        user_id: bystander,
        x: 1.0,
        y: 2.0,
    });
    handle.inbound("bystander-conn".to_string(), serde_json::to_string(&cursor).unwrap()).await;

    let reply = recv_message(&mut bystander_rx).await;
    assert!(matches!(reply, Message::Error(_)));

    let mut pending = tokio_test::task::spawn(host_rx.recv());
    tokio_test::assert_pending!(pending.poll());
}

#[tokio::test]
async fn end_session_prevents_further_lookup_and_is_idempotent_against_recreation() {
    let hub = Hub::new(Arc::new(MemoryStore));
    let diagram_id = DiagramId::new();
    let host = UserId::new();

    hub.create_session(diagram_id, host).await.unwrap();
    assert!(hub.has_active_session(diagram_id));

    hub.end_session(diagram_id).await.unwrap();
    assert!(!hub.has_active_session(diagram_id));

    // a fresh session can be created for the same diagram once the old one is gone
    hub.create_session(diagram_id, host).await.unwrap();
    assert!(hub.has_active_session(diagram_id));
}
