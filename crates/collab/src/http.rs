//! Collaboration and add-on invocation HTTP endpoints (§4.I, §6).
//!
//! Grounded on the teacher's axum `Router`/`AppState` wiring shape
//! (`gateway/src/server.rs`), kept without its ~9.5k lines of unrelated
//! routes, and `request_throttle.rs`'s rate-gate-before-upgrade pattern for
//! `GET …/ws`.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tmi_common::{DiagramId, InvocationId, ThreatModelId};
use tmi_ratelimit::{Limit, Scope, ScopedCheck, check_fixed_order};
use tmi_webhooks::{InvocationStatus, NewInvocation};

use crate::auth::{AuthenticatedUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::net::resolve_client_ip;
use crate::state::AppState;
use crate::ws;

const WS_CONNECT_SESSION_LIMIT: Limit = Limit { requests: 5, window_secs: 60 };
const WS_CONNECT_IP_LIMIT: Limit = Limit { requests: 100, window_secs: 60 };
const WS_CONNECT_USER_LIMIT: Limit = Limit { requests: 10, window_secs: 3600 };
const INVOCATIONS_PER_HOUR_LIMIT: Limit = Limit { requests: 10, window_secs: 3600 };

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/threat_models/{tm}/diagrams/{d}/collaborate",
            get(get_collaboration).post(create_collaboration).delete(end_collaboration),
        )
        .route("/threat_models/{tm}/diagrams/{d}/ws", get(ws_upgrade))
        .route("/addons/{addon_id}/invoke", post(invoke_addon))
        .route("/invocations/{id}", get(get_invocation))
        .route("/invocations", get(list_invocations))
        .route("/invocations/{id}/status", post(update_invocation_status))
        .with_state(state)
}

#[derive(Serialize)]
struct CollaborationResponse {
    session_id: uuid::Uuid,
    threat_model_id: uuid::Uuid,
    diagram_id: uuid::Uuid,
    participants: Vec<tmi_protocol::Participant>,
    websocket_url: String,
}

fn websocket_url(threat_model_id: ThreatModelId, diagram_id: DiagramId) -> String {
    format!("/threat_models/{}/diagrams/{}/ws", threat_model_id.as_uuid(), diagram_id.as_uuid())
}

async fn authorize(state: &AppState, threat_model_id: ThreatModelId, user: &AuthenticatedUser, required: Role) -> ApiResult<()> {
    let role = state.diagram_store.role_for(threat_model_id, user.user_id).await?;
    if !role.at_least(required) {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

async fn get_collaboration(
    State(state): State<AppState>,
    Path((tm, d)): Path<(ThreatModelId, DiagramId)>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, tm, &user, Role::Reader).await?;
    let Some(handle) = state.hub.get(d) else { return Err(ApiError::NotFound) };
    let participants = handle.participants().await;

    Ok(Json(CollaborationResponse {
        session_id: handle.session_id.as_uuid(),
        threat_model_id: handle.threat_model_id.as_uuid(),
        diagram_id: handle.diagram_id.as_uuid(),
        participants,
        websocket_url: websocket_url(handle.threat_model_id, handle.diagram_id),
    }))
}

async fn create_collaboration(
    State(state): State<AppState>,
    Path((tm, d)): Path<(ThreatModelId, DiagramId)>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, tm, &user, Role::Writer).await?;

    if let Some(handle) = state.hub.get(d) {
        let participants = handle.participants().await;
        return Ok((
            axum::http::StatusCode::OK,
            Json(CollaborationResponse {
                session_id: handle.session_id.as_uuid(),
                threat_model_id: handle.threat_model_id.as_uuid(),
                diagram_id: handle.diagram_id.as_uuid(),
                participants,
                websocket_url: websocket_url(handle.threat_model_id, handle.diagram_id),
            }),
        ));
    }

    let handle = state.hub.create_session(d, user.user_id).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(CollaborationResponse {
            session_id: handle.session_id.as_uuid(),
            threat_model_id: handle.threat_model_id.as_uuid(),
            diagram_id: handle.diagram_id.as_uuid(),
            participants: Vec::new(),
            websocket_url: websocket_url(handle.threat_model_id, handle.diagram_id),
        }),
    ))
}

async fn end_collaboration(
    State(state): State<AppState>,
    Path((tm, d)): Path<(ThreatModelId, DiagramId)>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, tm, &user, Role::Owner).await?;

    let Some(handle) = state.hub.get(d) else { return Err(ApiError::NotFound) };
    if handle.host != user.user_id {
        return Err(ApiError::Forbidden);
    }
    state.hub.end_session(d).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path((tm, d)): Path<(ThreatModelId, DiagramId)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    user: AuthenticatedUser,
    upgrade: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, tm, &user, Role::Reader).await?;

    let client_ip = resolve_client_ip(&headers, addr, state.behind_proxy);
    let user_key = user.user_id.as_uuid().to_string();
    let ip_key = client_ip.to_string();

    let mut limiter = state.limiter.clone();
    let decision = check_fixed_order(
        &mut limiter,
        &[
            ScopedCheck { scope: Scope::Session, key: &user_key, limit: WS_CONNECT_SESSION_LIMIT },
            ScopedCheck { scope: Scope::Ip, key: &ip_key, limit: WS_CONNECT_IP_LIMIT },
            ScopedCheck { scope: Scope::User, key: &user_key, limit: WS_CONNECT_USER_LIMIT },
        ],
    )
    .await;
    if !decision.allowed {
        let scope = decision.denied_scope.unwrap_or(Scope::Session);
        return Err(ApiError::RateLimited {
            retry_after_secs: decision.decision.retry_after_secs.unwrap_or(60),
            scope: scope.as_str().to_string(),
        });
    }

    let handle = state.hub.get_or_create_session(d, user.user_id).await?;
    Ok(upgrade.on_upgrade(move |socket| ws::handle_connection(socket, handle, user)))
}

#[derive(Deserialize)]
struct InvokeAddonBody {
    threat_model_id: ThreatModelId,
    object_type: Option<String>,
    object_id: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct InvokeAddonResponse {
    invocation_id: uuid::Uuid,
    status: &'static str,
    created_at: chrono::DateTime<chrono::Utc>,
}

async fn invoke_addon(
    State(mut state): State<AppState>,
    Path(addon_id): Path<String>,
    user: AuthenticatedUser,
    Json(body): Json<InvokeAddonBody>,
) -> ApiResult<impl IntoResponse> {
    let mut limiter = state.limiter.clone();
    let decision = check_fixed_order(
        &mut limiter,
        &[ScopedCheck {
            scope: Scope::WebhookInvocationsPerHour,
            key: &user.user_id.as_uuid().to_string(),
            limit: INVOCATIONS_PER_HOUR_LIMIT,
        }],
    )
    .await;
    if !decision.allowed {
        return Err(ApiError::RateLimited {
            retry_after_secs: decision.decision.retry_after_secs.unwrap_or(3600),
            scope: Scope::WebhookInvocationsPerHour.as_str().to_string(),
        });
    }

    if state.invocations.count_active_for_user(user.user_id).await? >= 1 {
        return Err(ApiError::Conflict("only one active add-on invocation is allowed per user".to_string()));
    }

    let now = chrono::Utc::now();
    let invocation = tmi_webhooks::Invocation::new(
        NewInvocation {
            addon_id,
            threat_model_id: body.threat_model_id,
            object_type: body.object_type,
            object_id: body.object_id,
            invoked_by_uuid: user.user_id,
            invoked_by_id: user.provider_id.clone().unwrap_or_else(|| user.user_id.as_uuid().to_string()),
            invoked_by_email: user.email.clone(),
            invoked_by_name: user.display_name.clone(),
            payload: body.payload,
        },
        now,
    )?;

    state.invocations.insert(&invocation).await?;
    state.dispatch.enqueue(invocation.id).await;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(InvokeAddonResponse { invocation_id: invocation.id.as_uuid(), status: "pending", created_at: now }),
    ))
}

async fn get_invocation(
    State(mut state): State<AppState>,
    Path(id): Path<InvocationId>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    let invocation = state.invocations.get(id).await?;
    if invocation.invoked_by_uuid != user.user_id && !user.is_admin {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(invocation))
}

#[derive(Deserialize)]
struct ListInvocationsQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    status: Option<InvocationStatus>,
}

fn default_limit() -> u32 {
    50
}

async fn list_invocations(
    State(mut state): State<AppState>,
    Query(query): Query<ListInvocationsQuery>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.clamp(1, 500) as usize;
    let offset = query.offset as usize;

    let invocations = state.invocations.list_for_user(user.user_id, user.is_admin, query.status).await?;
    let page: Vec<_> = invocations.into_iter().skip(offset).take(limit).collect();
    Ok(Json(page))
}

#[derive(Deserialize)]
struct UpdateStatusBody {
    status: InvocationStatus,
    status_percent: i32,
    status_message: Option<String>,
}

async fn update_invocation_status(
    State(mut state): State<AppState>,
    Path(id): Path<InvocationId>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<impl IntoResponse> {
    let invocation = state.invocations.get(id).await?;
    let subscription = state
        .subscriptions
        .get(&invocation.addon_id)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound)?;

    let signature = headers
        .get(tmi_webhooks::hmac::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !tmi_webhooks::hmac::verify(&subscription.secret, &body, signature) {
        return Err(ApiError::Unauthorized);
    }

    let parsed: UpdateStatusBody = serde_json::from_slice(&body).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    if matches!(parsed.status, InvocationStatus::Pending) {
        return Err(ApiError::InvalidInput("status must be in_progress, completed, or failed".to_string()));
    }

    tmi_webhooks::apply_inbound_status_update(
        &mut state.invocations,
        id,
        parsed.status,
        parsed.status_percent,
        parsed.status_message,
    )
    .await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}
