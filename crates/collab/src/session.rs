//! Per-diagram session actor (§3, §4.G).
//!
//! A single task owns the clients map and the diagram's cells, processing
//! inbound commands one at a time off an mpsc channel — the pipeline parse →
//! authorize → sequence-check → apply → broadcast/persist runs serialized,
//! needing no additional locking over membership (§5 "Scheduling").
//! Grounded on `gateway/src/state.rs`'s `ConnectedClient`/`DedupeCache` and
//! `gateway/src/broadcast.rs`'s single-owner fan-out loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tmi_common::{DiagramId, SessionId, ThreatModelId, UserId};
use tmi_protocol::{
    Cell, CellOperation, ChangePresenter, ChangePresenterRequest, CurrentPresenter,
    DiagramOperationEvent, DiagramOperationRequest, DiagramStateSync, ErrorMessage,
    HistoryKind, HistoryOperation, InitiatingUser, Message, OperationRejected, Participant,
    ParticipantsUpdate, PresenterCursor, PresenterDenied, PresenterRequest, PresenterSelection,
    RedoRequest, RejectionReason, RemoveParticipant, RemoveParticipantRequest, ResyncRequest,
    ResyncResponse, StateCorrection, UndoRequest, UpdateVector, codec,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use tmi_metrics::{counter, diagram, gauge, labels, session as session_metrics};

use crate::auth::{DiagramStore, Role, required_role_for_mutation, required_role_for_presenter_or_removal};
use crate::diagram::{ApplyOutcome, Diagram};

const CORRECTION_DECAY_INTERVAL: Duration = Duration::from_secs(30);
const CORRECTION_CAP: u32 = 10;
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Terminating,
    Terminated,
}

struct Client {
    conn_id: String,
    user_id: UserId,
    provider_id: Option<String>,
    display_name: Option<String>,
    email: Option<String>,
    role: Role,
    tx: mpsc::Sender<String>,
    last_seen_sequence: Option<u64>,
    recent_corrections: u32,
    last_decay_at: Instant,
}

impl Client {
    fn as_participant(&self) -> Participant {
        Participant { user_id: self.user_id, display_name: self.display_name.clone(), email: self.email.clone() }
    }

    fn initiating_user(&self) -> InitiatingUser {
        InitiatingUser {
            user_id: self.user_id,
            provider_id: self.provider_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }

    fn send(&self, message: &Message) {
        let Ok(json) = serde_json::to_string(message) else {
            warn!(conn_id = %self.conn_id, "failed to serialize outbound message");
            return;
        };
        if self.tx.try_send(json).is_err() {
            warn!(conn_id = %self.conn_id, "outbound queue full or closed, client will be dropped");
        }
    }

    /// Decay `recent_corrections` by one per elapsed interval (§9 open
    /// question: bounded decaying counter, not tied to any backoff policy).
    fn decay_corrections(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_decay_at);
        let ticks = (elapsed.as_secs() / CORRECTION_DECAY_INTERVAL.as_secs()) as u32;
        if ticks > 0 {
            self.recent_corrections = self.recent_corrections.saturating_sub(ticks);
            self.last_decay_at = now;
        }
    }

    fn bump_corrections(&mut self) {
        self.decay_corrections(Instant::now());
        self.recent_corrections = (self.recent_corrections + 1).min(CORRECTION_CAP);
    }
}

enum Command {
    Join {
        conn_id: String,
        user_id: UserId,
        provider_id: Option<String>,
        display_name: Option<String>,
        email: Option<String>,
        role: Role,
        reply: oneshot::Sender<mpsc::Receiver<String>>,
    },
    Leave {
        conn_id: String,
    },
    Inbound {
        conn_id: String,
        raw: String,
    },
    Terminate {
        reply: oneshot::Sender<()>,
    },
    Participants {
        reply: oneshot::Sender<Vec<Participant>>,
    },
}

/// A lightweight, cloneable reference to a running session, usable without
/// going through its actor loop for read-mostly metadata.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub diagram_id: DiagramId,
    pub threat_model_id: ThreatModelId,
    pub host: UserId,
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn join(
        &self,
        conn_id: String,
        user_id: UserId,
        provider_id: Option<String>,
        display_name: Option<String>,
        email: Option<String>,
        role: Role,
    ) -> Option<mpsc::Receiver<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Join { conn_id, user_id, provider_id, display_name, email, role, reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn leave(&self, conn_id: String) {
        let _ = self.tx.send(Command::Leave { conn_id }).await;
    }

    pub async fn inbound(&self, conn_id: String, raw: String) {
        let _ = self.tx.send(Command::Inbound { conn_id, raw }).await;
    }

    pub async fn terminate(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Terminate { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn participants(&self) -> Vec<Participant> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Participants { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

struct Session {
    session_id: SessionId,
    diagram_id: DiagramId,
    threat_model_id: ThreatModelId,
    host: UserId,
    state: SessionState,
    current_presenter: UserId,
    next_sequence_number: u64,
    clients: HashMap<String, Client>,
    diagram: Diagram,
    store: Arc<dyn DiagramStore>,
}

/// Spawn a session actor and return its handle. `initial_cells` comes from
/// the REST collaborator's authoritative diagram state (§1, §4.H).
pub fn spawn(
    diagram_id: DiagramId,
    threat_model_id: ThreatModelId,
    host: UserId,
    initial_cells: Vec<Cell>,
    store: Arc<dyn DiagramStore>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(256);
    let session_id = SessionId::new();

    let session = Session {
        session_id,
        diagram_id,
        threat_model_id,
        host,
        state: SessionState::Active,
        current_presenter: host,
        next_sequence_number: 1,
        clients: HashMap::new(),
        diagram: Diagram::new(initial_cells),
        store,
    };

    tokio::spawn(session.run(rx));

    SessionHandle { session_id, diagram_id, threat_model_id, host, tx }
}

impl Session {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(session_id = %self.session_id.as_uuid(), diagram_id = %self.diagram_id.as_uuid(), "session started");
        #[cfg(feature = "metrics")]
        gauge!(diagram::ACTIVE).increment(1.0);

        while let Some(command) = rx.recv().await {
            match command {
                Command::Join { conn_id, user_id, provider_id, display_name, email, role, reply } => {
                    self.handle_join(conn_id, user_id, provider_id, display_name, email, role, reply).await;
                }
                Command::Leave { conn_id } => self.handle_leave(&conn_id).await,
                Command::Inbound { conn_id, raw } => self.handle_inbound(&conn_id, &raw).await,
                Command::Terminate { reply } => {
                    self.handle_terminate().await;
                    let _ = reply.send(());
                    break;
                }
                Command::Participants { reply } => {
                    let list = self.clients.values().map(Client::as_participant).collect();
                    let _ = reply.send(list);
                }
            }
        }

        #[cfg(feature = "metrics")]
        gauge!(diagram::ACTIVE).decrement(1.0);
        info!(session_id = %self.session_id.as_uuid(), "session ended");
    }

    async fn handle_join(
        &mut self,
        conn_id: String,
        user_id: UserId,
        provider_id: Option<String>,
        display_name: Option<String>,
        email: Option<String>,
        role: Role,
        reply: oneshot::Sender<mpsc::Receiver<String>>,
    ) {
        let (tx, client_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let client = Client {
            conn_id: conn_id.clone(),
            user_id,
            provider_id,
            display_name,
            email,
            role,
            tx,
            last_seen_sequence: None,
            recent_corrections: 0,
            last_decay_at: Instant::now(),
        };

        client.send(&Message::DiagramStateSync(DiagramStateSync {
            diagram_id: self.diagram_id,
            cells: self.diagram.cells().to_vec(),
            sequence_number: self.next_sequence_number.saturating_sub(1),
        }));

        self.clients.insert(conn_id, client);
        #[cfg(feature = "metrics")]
        counter!(session_metrics::CONNECTIONS_TOTAL).increment(1);
        #[cfg(feature = "metrics")]
        gauge!(session_metrics::CONNECTIONS_ACTIVE).increment(1.0);

        self.broadcast_participants();
        let _ = reply.send(client_rx);
    }

    async fn handle_leave(&mut self, conn_id: &str) {
        if self.clients.remove(conn_id).is_some() {
            #[cfg(feature = "metrics")]
            gauge!(session_metrics::CONNECTIONS_ACTIVE).decrement(1.0);
            self.broadcast_participants();
        }
    }

    async fn handle_terminate(&mut self) {
        self.state = SessionState::Terminating;
        // dropping each client's sender half closes its writer task's channel
        self.clients.clear();
        self.state = SessionState::Terminated;
    }

    async fn handle_inbound(&mut self, conn_id: &str, raw: &str) {
        #[cfg(feature = "metrics")]
        counter!(session_metrics::MESSAGES_RECEIVED_TOTAL).increment(1);

        let message = match codec::parse_message(raw) {
            Ok(m) => m,
            Err(err) => {
                self.reply_error(conn_id, "invalid_message", err.to_string(), None);
                return;
            }
        };

        let Some(sender_role) = self.clients.get(conn_id).map(|c| c.role) else { return };
        let type_name = message.type_name();

        match message {
            Message::DiagramOperationRequest(req) => {
                if !sender_role.at_least(required_role_for_mutation()) {
                    self.reply_denied(conn_id, type_name);
                    return;
                }
                self.handle_operation_request(conn_id, req).await;
            }
            Message::ChangePresenterRequest(req) => {
                if self.clients.get(conn_id).map(|c| c.user_id) != Some(self.host)
                    || !sender_role.at_least(required_role_for_presenter_or_removal())
                {
                    self.reply_denied(conn_id, type_name);
                    return;
                }
                self.handle_change_presenter(conn_id, req.diagram_id, req.new_presenter);
            }
            Message::ChangePresenter(ChangePresenter { diagram_id, new_presenter }) => {
                // host reclaiming or directly setting presenter; no denial path (DESIGN.md).
                if self.clients.get(conn_id).map(|c| c.user_id) != Some(self.host)
                    || !sender_role.at_least(required_role_for_presenter_or_removal())
                {
                    self.reply_denied(conn_id, type_name);
                    return;
                }
                self.current_presenter = new_presenter;
                #[cfg(feature = "metrics")]
                counter!(diagram::PRESENTER_CHANGES_TOTAL).increment(1);
                self.broadcast(&Message::CurrentPresenter(CurrentPresenter { diagram_id, presenter: new_presenter }));
            }
            Message::PresenterRequest(PresenterRequest { diagram_id }) => {
                let requester = self.clients.get(conn_id).map(|c| c.user_id);
                if requester == Some(self.host) {
                    if let Some(requester) = requester {
                        self.handle_change_presenter(conn_id, diagram_id, requester);
                    }
                } else if let Some(client) = self.clients.get(conn_id) {
                    client.send(&Message::PresenterDenied(PresenterDenied {
                        diagram_id,
                        reason: Some("only the host may grant presenter".to_string()),
                    }));
                }
            }
            Message::RemoveParticipantRequest(RemoveParticipantRequest { diagram_id, user_id }) => {
                if !sender_role.at_least(required_role_for_presenter_or_removal()) {
                    self.reply_denied(conn_id, type_name);
                    return;
                }
                self.handle_remove_participant(diagram_id, user_id);
            }
            Message::PresenterCursor(PresenterCursor { diagram_id, user_id, x, y }) => {
                self.forward_presenter_only(conn_id, Message::PresenterCursor(PresenterCursor { diagram_id, user_id, x, y }));
            }
            Message::PresenterSelection(PresenterSelection { diagram_id, user_id, cell_ids }) => {
                self.forward_presenter_only(
                    conn_id,
                    Message::PresenterSelection(PresenterSelection { diagram_id, user_id, cell_ids }),
                );
            }
            Message::ResyncRequest(ResyncRequest { diagram_id }) => {
                if let Some(client) = self.clients.get(conn_id) {
                    client.send(&Message::ResyncResponse(ResyncResponse {
                        diagram_id,
                        cells: self.diagram.cells().to_vec(),
                        sequence_number: self.next_sequence_number.saturating_sub(1),
                    }));
                }
            }
            Message::UndoRequest(UndoRequest { diagram_id }) => {
                self.reply_history_noop(conn_id, diagram_id, HistoryKind::Undo);
            }
            Message::RedoRequest(RedoRequest { diagram_id }) => {
                self.reply_history_noop(conn_id, diagram_id, HistoryKind::Redo);
            }
            other => {
                debug!(session_id = %self.session_id.as_uuid(), message_type = other.type_name(), "ignoring unsupported inbound message kind");
            }
        }
    }

    /// Undo/redo stacks are out of this core's scope (§1 non-goals exclude
    /// CRDT-grade history); an `undo_request`/`redo_request` with nothing to
    /// replay yields an empty `history_operation` so clients don't stall.
    fn reply_history_noop(&self, conn_id: &str, diagram_id: DiagramId, kind: HistoryKind) {
        if let Some(client) = self.clients.get(conn_id) {
            client.send(&Message::HistoryOperation(HistoryOperation {
                diagram_id,
                kind,
                operations: Vec::new(),
                sequence_number: self.next_sequence_number.saturating_sub(1),
            }));
        }
    }

    async fn handle_operation_request(&mut self, conn_id: &str, req: DiagramOperationRequest) {
        let operations = tmi_protocol::dedupe_operations(req.operations);
        if operations.is_empty() {
            self.reply_rejected(conn_id, None, RejectionReason::EmptyOperation, vec![], false);
            return;
        }
        for op in &operations {
            if op.validate().is_err() {
                self.reply_rejected(conn_id, Some(op.id), RejectionReason::ValidationFailed, vec![op.id], false);
                return;
            }
        }

        if let Some(client_seq) = req.sequence_number
            && let Some(client) = self.clients.get_mut(conn_id)
        {
            let authoritative = self.next_sequence_number.saturating_sub(1);
            let is_gap_or_dup = match client.last_seen_sequence {
                Some(last) => client_seq <= last || client_seq > last + 1,
                None => client_seq != authoritative,
            };
            if is_gap_or_dup {
                client.bump_corrections();
                let vector = UpdateVector {
                    sequence_number: authoritative,
                    recent_corrections: client.recent_corrections,
                };
                client.send(&Message::StateCorrection(StateCorrection {
                    diagram_id: req.diagram_id,
                    update_vector: vector,
                    cells: None,
                }));
                return;
            }
            client.last_seen_sequence = Some(client_seq);
        }

        let outcome = self.diagram.apply(&operations);
        match outcome {
            ApplyOutcome::NoChange => {
                self.reply_rejected(conn_id, None, RejectionReason::NoStateChange, vec![], false);
            }
            ApplyOutcome::Conflict { reason, affected_cells } => {
                #[cfg(feature = "metrics")]
                counter!(session_metrics::OPERATIONS_REJECTED_TOTAL, labels::REASON => "conflict_detected").increment(1);
                self.reply_rejected(conn_id, None, reason, affected_cells, true);
            }
            ApplyOutcome::Applied { cells } => {
                let sequence_number = self.next_sequence_number;
                self.next_sequence_number += 1;

                if let Err(err) = self.store.persist_cells(self.diagram_id, &cells).await {
                    warn!(session_id = %self.session_id.as_uuid(), %err, "failed to persist diagram cells");
                }

                let mut initiating_user = self
                    .clients
                    .get(conn_id)
                    .map(Client::initiating_user)
                    .unwrap_or(InitiatingUser {
                        user_id: self.host,
                        provider_id: None,
                        email: None,
                        display_name: None,
                    });

                if let Err(err) = initiating_user.validate() {
                    warn!(
                        session_id = %self.session_id.as_uuid(),
                        user_id = %initiating_user.user_id.as_uuid(),
                        %err,
                        "initiating_user failed identity invariant, substituting synthetic provider_id"
                    );
                    initiating_user.provider_id = Some(format!("synthetic:{}", initiating_user.user_id.as_uuid()));
                }

                #[cfg(feature = "metrics")]
                counter!(diagram::OPERATIONS_APPLIED_TOTAL).increment(operations.len() as u64);

                self.broadcast(&Message::DiagramOperationEvent(DiagramOperationEvent {
                    diagram_id: self.diagram_id,
                    operations,
                    sequence_number,
                    initiating_user,
                }));
            }
        }
    }

    fn handle_change_presenter(&mut self, origin_conn_id: &str, diagram_id: DiagramId, new_presenter: UserId) {
        let is_current_client = self.clients.values().any(|c| c.user_id == new_presenter);
        if !is_current_client {
            if let Some(client) = self.clients.get(origin_conn_id) {
                client.send(&Message::PresenterDenied(PresenterDenied {
                    diagram_id,
                    reason: Some("target user is not a current participant".to_string()),
                }));
            }
            return;
        }

        self.current_presenter = new_presenter;
        #[cfg(feature = "metrics")]
        counter!(diagram::PRESENTER_CHANGES_TOTAL).increment(1);
        self.broadcast(&Message::CurrentPresenter(CurrentPresenter { diagram_id, presenter: new_presenter }));
    }

    fn handle_remove_participant(&mut self, diagram_id: DiagramId, user_id: UserId) {
        let removed_conn_ids: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, c)| c.user_id == user_id)
            .map(|(conn_id, _)| conn_id.clone())
            .collect();
        for conn_id in removed_conn_ids {
            self.clients.remove(&conn_id);
        }
        self.broadcast(&Message::RemoveParticipant(RemoveParticipant { diagram_id, user_id }));
        self.broadcast_participants();
    }

    /// Presenter-only messages (cursor/selection) from a non-presenter are
    /// silently dropped with an `error` sent to origin only (§4.G).
    fn forward_presenter_only(&self, conn_id: &str, message: Message) {
        let Some(sender) = self.clients.get(conn_id) else { return };
        if sender.user_id != self.current_presenter {
            self.reply_error(conn_id, "not_presenter", "only the presenter may send this message".to_string(), Some(message.type_name().to_string()));
            return;
        }
        self.broadcast(&message);
    }

    fn broadcast(&self, message: &Message) {
        let Ok(json) = serde_json::to_string(message) else { return };
        for client in self.clients.values() {
            if client.tx.try_send(json.clone()).is_err() {
                warn!(conn_id = %client.conn_id, "dropping slow client, outbound queue full");
            }
        }
        #[cfg(feature = "metrics")]
        counter!(session_metrics::MESSAGES_SENT_TOTAL).increment(self.clients.len() as u64);
    }

    fn broadcast_participants(&self) {
        let participants = self.clients.values().map(Client::as_participant).collect();
        self.broadcast(&Message::ParticipantsUpdate(ParticipantsUpdate { diagram_id: self.diagram_id, participants }));
    }

    fn reply_error(&self, conn_id: &str, code: &str, message: String, original_message_type: Option<String>) {
        if let Some(client) = self.clients.get(conn_id) {
            client.send(&Message::Error(ErrorMessage { code: code.to_string(), message, original_message_type }));
        }
    }

    fn reply_denied(&self, conn_id: &str, message_type: &str) {
        self.reply_error(conn_id, "permission_denied", "insufficient role for this operation".to_string(), Some(message_type.to_string()));
    }

    fn reply_rejected(
        &self,
        conn_id: &str,
        operation_id: Option<uuid::Uuid>,
        reason: RejectionReason,
        affected_cells: Vec<uuid::Uuid>,
        requires_resync: bool,
    ) {
        if let Some(client) = self.clients.get(conn_id) {
            client.send(&Message::OperationRejected(OperationRejected {
                diagram_id: self.diagram_id,
                operation_id,
                reason,
                affected_cells,
                requires_resync,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DiagramSnapshot;
    use crate::error::ApiError;
    use async_trait::async_trait;

    struct NoopStore;

    #[async_trait]
    impl DiagramStore for NoopStore {
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

    #[tokio::test]
    async fn join_receives_initial_state_sync() {
        let diagram_id = DiagramId::new();
        let host = UserId::new();
        let handle = spawn(diagram_id, ThreatModelId::new(), host, Vec::new(), Arc::new(NoopStore));

        let mut rx = handle
            .join("conn-1".to_string(), host, Some("idp:1".to_string()), None, None, Role::Owner)
            .await
            .expect("join should succeed");

        let first = rx.recv().await.expect("expected initial sync");
        let msg: Message = serde_json::from_str(&first).unwrap();
        assert!(matches!(msg, Message::DiagramStateSync(_)));
    }
}
