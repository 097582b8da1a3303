//! Stand-in for the upstream identity layer (§1 "External collaborators":
//! authentication is explicitly out of scope for the core). `AuthenticatedUser`
//! is read out of request extensions by `tmi_collab::auth`'s extractor, so
//! something has to put one there — in a real deployment that's a gateway's
//! session/JWT validation; here it's a header-based stand-in so the binary is
//! runnable standalone.
//!
//! Grounded on the teacher's `gateway/src/auth_middleware.rs::require_auth`
//! shape (a `middleware::Next` layer run before the protected routes).

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tmi_collab::auth::{AuthenticatedUser, Role};
use tmi_common::UserId;

const HEADER_USER_ID: &str = "x-tmi-user-id";
const HEADER_EMAIL: &str = "x-tmi-user-email";
const HEADER_NAME: &str = "x-tmi-user-name";
const HEADER_ADMIN: &str = "x-tmi-admin";

/// Reads identity headers and attaches an `AuthenticatedUser` extension.
/// Missing `x-tmi-user-id` is rejected with 401; role defaults to `Owner`
/// since the real role check happens downstream via `DiagramStore::role_for`.
pub async fn attach_identity(headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = headers
        .get(HEADER_USER_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<uuid::Uuid>().ok())
        .map(UserId::from_uuid)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let email = headers.get(HEADER_EMAIL).and_then(|v| v.to_str().ok()).map(str::to_string);
    let display_name = headers.get(HEADER_NAME).and_then(|v| v.to_str().ok()).map(str::to_string);
    let is_admin = headers.get(HEADER_ADMIN).and_then(|v| v.to_str().ok()).is_some_and(|v| v == "true");

    request.extensions_mut().insert(AuthenticatedUser {
        user_id,
        provider_id: Some(user_id.as_uuid().to_string()),
        email,
        display_name,
        role: Role::Owner,
        is_admin,
    });

    Ok(next.run(request).await)
}
