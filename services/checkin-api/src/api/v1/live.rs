//! Live updates over WebSocket.
//!
//! GET /v1/live upgrades to a WebSocket that first receives a snapshot of
//! every event, then every broadcast on the live transport as a text frame
//! `{"event": "<channel>", "data": <payload>}`. Credentials come from the
//! Authorization header or, for browsers, a `?token=` query parameter.

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use checkin_id::UserId;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::authz::STAFF;
use crate::api::error::ApiError;
use crate::api::request_context::{authenticate, bearer_token, request_id};
use crate::notifier::{self, LiveMessage, EVENT_UPDATED};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/live", get(connect))
}

#[derive(Debug, Deserialize)]
struct LiveQuery {
    token: Option<String>,
}

async fn connect(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = request_id(&headers);

    let token = match bearer_token(&headers, &request_id)? {
        Some(token) => token,
        None => query
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ApiError::unauthorized("unauthorized", "Missing or invalid Authorization token")
                    .with_request_id(request_id.clone())
            })?,
    };

    let subject = authenticate(&state, token.trim(), &request_id)?;
    if !STAFF.contains(&subject.role) {
        return Err(ApiError::forbidden(
            "forbidden",
            "Insufficient permissions for this operation",
        )
        .with_request_id(request_id));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, subject.id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: UserId) {
    // Subscribe before the snapshot so nothing committed in between is missed.
    let mut updates = state.hub().subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!(user_id = %user_id, "Live subscriber connected");

    match notifier::snapshot(state.event_store()).await {
        Ok(data) => {
            let initial = LiveMessage {
                event: EVENT_UPDATED.to_string(),
                data,
            };
            if !send(&mut sender, &initial).await {
                return;
            }
        }
        Err(e) => warn!(error = %e, user_id = %user_id, "Failed to load live snapshot"),
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(message) => {
                    if !send(&mut sender, &message).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = %user_id, skipped, "Live subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(error = ?e, user_id = %user_id, "WebSocket error");
                    break;
                }
            },
        }
    }

    info!(user_id = %user_id, "Live subscriber disconnected");
}

/// False once the socket can no longer be written to.
async fn send<S>(sender: &mut S, message: &LiveMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode live message");
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
