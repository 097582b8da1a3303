//! WebSocket connection lifecycle for a collaboration session (§4.I, §5).
//!
//! Grounded on the teacher's `gateway/src/ws.rs`: split the socket into a
//! write task fed by an mpsc channel and a read loop on the connection task,
//! heartbeat via ping/pong, clean up on either side closing. Unlike the
//! teacher, there is no in-band handshake — `AuthenticatedUser` is already
//! resolved by the HTTP layer before `WebSocketUpgrade` fires, so the first
//! thing this does is join the session.

use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tmi_protocol::{MAX_FRAME_BYTES, PING_INTERVAL_MS, READ_DEADLINE_MS};
use tracing::{debug, info, warn};

use crate::auth::AuthenticatedUser;
use crate::session::SessionHandle;

pub async fn handle_connection(socket: WebSocket, handle: SessionHandle, user: AuthenticatedUser) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, user_id = %user.user_id.as_uuid(), "ws: connection opened");

    let Some(mut outbound_rx) = handle
        .join(conn_id.clone(), user.user_id, user.provider_id.clone(), user.display_name.clone(), user.email.clone(), user.role)
        .await
    else {
        warn!(conn_id = %conn_id, "ws: session actor unavailable, refusing connection");
        return;
    };

    let (mut ws_tx, mut ws_rx) = socket.split();

    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_millis(PING_INTERVAL_MS));
        ping_interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if ws_tx.send(WsMessage::Text(msg.into())).await.is_err() {
                        debug!(conn_id = %write_conn_id, "ws: write failed, closing");
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        debug!(conn_id = %write_conn_id, "ws: ping failed, closing");
                        break;
                    }
                }
            }
        }
    });

    let read_deadline = Duration::from_millis(READ_DEADLINE_MS);
    loop {
        let next = match tokio::time::timeout(read_deadline, ws_rx.next()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                warn!(conn_id = %conn_id, "ws: read deadline exceeded, closing");
                break;
            }
        };

        let text = match next {
            Ok(WsMessage::Text(t)) => t.to_string(),
            Ok(WsMessage::Pong(_)) => continue,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            }
        };

        if text.len() > MAX_FRAME_BYTES {
            warn!(conn_id = %conn_id, size = text.len(), "ws: frame too large, dropping");
            continue;
        }

        handle.inbound(conn_id.clone(), text).await;
    }

    handle.leave(conn_id.clone()).await;
    write_handle.abort();
    info!(conn_id = %conn_id, "ws: connection closed");
}
