//! The tagged-union message set (§4.F).

use serde::{Deserialize, Serialize};
use tmi_common::{DiagramId, UserId};
use uuid::Uuid;

use crate::{
    cell::{Cell, CellOperation, RejectionReason},
    user::{InitiatingUser, Participant},
};

/// Discriminated union of every frame that can cross the collaboration
/// channel, tagged on the wire by `message_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    DiagramOperationRequest(DiagramOperationRequest),
    DiagramOperationEvent(DiagramOperationEvent),
    PresenterRequest(PresenterRequest),
    PresenterDenied(PresenterDenied),
    ChangePresenterRequest(ChangePresenterRequest),
    ChangePresenter(ChangePresenter),
    RemoveParticipantRequest(RemoveParticipantRequest),
    RemoveParticipant(RemoveParticipant),
    CurrentPresenter(CurrentPresenter),
    PresenterCursor(PresenterCursor),
    PresenterSelection(PresenterSelection),
    AuthorizationDenied(AuthorizationDenied),
    StateCorrection(StateCorrection),
    DiagramStateSync(DiagramStateSync),
    ResyncRequest(ResyncRequest),
    ResyncResponse(ResyncResponse),
    HistoryOperation(HistoryOperation),
    UndoRequest(UndoRequest),
    RedoRequest(RedoRequest),
    ParticipantsUpdate(ParticipantsUpdate),
    Error(ErrorMessage),
    OperationRejected(OperationRejected),
}

impl Message {
    /// The wire name of this message's variant, for logging/metrics labels.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::DiagramOperationRequest(_) => "diagram_operation_request",
            Self::DiagramOperationEvent(_) => "diagram_operation_event",
            Self::PresenterRequest(_) => "presenter_request",
            Self::PresenterDenied(_) => "presenter_denied",
            Self::ChangePresenterRequest(_) => "change_presenter_request",
            Self::ChangePresenter(_) => "change_presenter",
            Self::RemoveParticipantRequest(_) => "remove_participant_request",
            Self::RemoveParticipant(_) => "remove_participant",
            Self::CurrentPresenter(_) => "current_presenter",
            Self::PresenterCursor(_) => "presenter_cursor",
            Self::PresenterSelection(_) => "presenter_selection",
            Self::AuthorizationDenied(_) => "authorization_denied",
            Self::StateCorrection(_) => "state_correction",
            Self::DiagramStateSync(_) => "diagram_state_sync",
            Self::ResyncRequest(_) => "resync_request",
            Self::ResyncResponse(_) => "resync_response",
            Self::HistoryOperation(_) => "history_operation",
            Self::UndoRequest(_) => "undo_request",
            Self::RedoRequest(_) => "redo_request",
            Self::ParticipantsUpdate(_) => "participants_update",
            Self::Error(_) => "error",
            Self::OperationRejected(_) => "operation_rejected",
        }
    }
}

/// Client → session: apply one or more cell patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramOperationRequest {
    pub diagram_id: DiagramId,
    pub operations: Vec<CellOperation>,
    /// Advisory only (§9 open question) — used for gap/duplicate detection,
    /// never to assign the authoritative sequence number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// Session → clients: operations applied and assigned a sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramOperationEvent {
    pub diagram_id: DiagramId,
    pub operations: Vec<CellOperation>,
    pub sequence_number: u64,
    pub initiating_user: InitiatingUser,
}

/// Client → session: ask to become presenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterRequest {
    pub diagram_id: DiagramId,
}

/// Session → client: presenter request refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterDenied {
    pub diagram_id: DiagramId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Host → session: transfer the presenter role to a named participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePresenterRequest {
    pub diagram_id: DiagramId,
    pub new_presenter: UserId,
}

/// Host → session: set the presenter directly (host is always authorized;
/// distinct from the request form in that it carries no denial path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePresenter {
    pub diagram_id: DiagramId,
    pub new_presenter: UserId,
}

/// Session → all clients: the presenter changed (§8 scenario 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentPresenter {
    pub diagram_id: DiagramId,
    pub presenter: UserId,
}

/// Host/owner → session: remove a participant from the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveParticipantRequest {
    pub diagram_id: DiagramId,
    pub user_id: UserId,
}

/// Session → all clients: a participant was removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveParticipant {
    pub diagram_id: DiagramId,
    pub user_id: UserId,
}

/// Presenter → session → other clients: cursor position, presenter-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterCursor {
    pub diagram_id: DiagramId,
    pub user_id: UserId,
    pub x: f64,
    pub y: f64,
}

/// Presenter → session → other clients: current selection, presenter-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterSelection {
    pub diagram_id: DiagramId,
    pub user_id: UserId,
    pub cell_ids: Vec<Uuid>,
}

/// Session → origin: the message was rejected by the authorization table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationDenied {
    pub diagram_id: DiagramId,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message_type: Option<String>,
}

/// Session → client: the client's view has diverged (duplicate or gap in
/// its advertised sequence number); carries the authoritative counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCorrection {
    pub diagram_id: DiagramId,
    pub update_vector: UpdateVector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<Cell>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVector {
    pub sequence_number: u64,
    /// §9 open question: a bounded, decaying counter of how many
    /// corrections this client has recently required. Not tied to any
    /// backoff policy; purely observable.
    pub recent_corrections: u32,
}

/// Session → client: full snapshot sent on join or resync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramStateSync {
    pub diagram_id: DiagramId,
    pub cells: Vec<Cell>,
    pub sequence_number: u64,
}

/// Client → session: "discard my state, send me the authoritative one".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncRequest {
    pub diagram_id: DiagramId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncResponse {
    pub diagram_id: DiagramId,
    pub cells: Vec<Cell>,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Undo,
    Redo,
}

/// Session → clients: an undo/redo was applied, broadcast like any other
/// operation event but tagged with which history direction produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryOperation {
    pub diagram_id: DiagramId,
    pub kind: HistoryKind,
    pub operations: Vec<CellOperation>,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoRequest {
    pub diagram_id: DiagramId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedoRequest {
    pub diagram_id: DiagramId,
}

/// Session → clients: the membership list changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantsUpdate {
    pub diagram_id: DiagramId,
    pub participants: Vec<Participant>,
}

/// Session → origin: an in-band error unrelated to a specific operation
/// (malformed frame, presenter-only message from a non-presenter, etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message_type: Option<String>,
}

/// Session → origin: an operation was applied-but-rejected (§4.F, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRejected {
    pub diagram_id: DiagramId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<Uuid>,
    pub reason: RejectionReason,
    #[serde(default)]
    pub affected_cells: Vec<Uuid>,
    pub requires_resync: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_diagram_operation_event() {
        let msg = Message::DiagramOperationEvent(DiagramOperationEvent {
            diagram_id: DiagramId::new(),
            operations: vec![],
            sequence_number: 7,
            initiating_user: InitiatingUser {
                user_id: UserId::new(),
                provider_id: Some("idp:1".to_string()),
                email: None,
                display_name: None,
            },
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"message_type\":\"diagram_operation_event\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.type_name(), "diagram_operation_event");
    }

    #[test]
    fn operation_rejected_defaults_affected_cells() {
        let json = serde_json::json!({
            "message_type": "operation_rejected",
            "diagram_id": DiagramId::new(),
            "reason": "conflict_detected",
            "requires_resync": true
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        let Message::OperationRejected(r) = msg else { panic!("wrong variant") };
        assert!(r.affected_cells.is_empty());
    }
}
