//! External-collaborator seams for authentication and diagram persistence
//! (§1 "External collaborators"): this core consumes an already-authenticated
//! identity and a `DiagramStore` it never implements concretely.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use tmi_common::{DiagramId, ThreatModelId, UserId};
use tmi_protocol::Cell;

use crate::error::ApiError;

/// A participant's authorization level within a threat model (§4.G point 2).
/// Ordered: `Reader < Writer < Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Reader,
    Writer,
    Owner,
}

impl Role {
    #[must_use]
    pub fn at_least(self, required: Role) -> bool {
        self >= required
    }
}

/// The identity and authorization level attached to a request by an upstream
/// layer (JWT/OAuth validation is explicitly out of scope, per §1). A host
/// wires in the concrete extraction (header parsing, token validation); this
/// core only reads the already-resolved identity out of request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub provider_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub is_admin: bool,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or((StatusCode::UNAUTHORIZED, "not authenticated"))
    }
}

/// Snapshot of a diagram's authoritative state as loaded from the REST
/// collaborator (§1, §4.H) at session creation.
pub struct DiagramSnapshot {
    pub threat_model_id: ThreatModelId,
    pub cells: Vec<Cell>,
}

/// The REST CRUD collaborator providing authoritative diagram/threat-model
/// persistence. This core reads initial state through it and persists
/// mutations back; it never owns the data itself.
#[async_trait]
pub trait DiagramStore: Send + Sync {
    async fn load_diagram(&self, diagram_id: DiagramId) -> Result<DiagramSnapshot, ApiError>;

    async fn persist_cells(&self, diagram_id: DiagramId, cells: &[Cell]) -> Result<(), ApiError>;

    /// The role `user_id` holds on the threat model owning `diagram_id`.
    async fn role_for(&self, threat_model_id: ThreatModelId, user_id: UserId) -> Result<Role, ApiError>;
}

/// Pure authorization check for an inbound message kind (§4.G point 2).
#[must_use]
pub fn required_role_for_mutation() -> Role {
    Role::Writer
}

#[must_use]
pub fn required_role_for_presenter_or_removal() -> Role {
    Role::Owner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_reader_writer_owner() {
        assert!(Role::Owner.at_least(Role::Writer));
        assert!(Role::Writer.at_least(Role::Writer));
        assert!(!Role::Reader.at_least(Role::Writer));
    }
}
