//! Event, entry and door-keeper endpoints.
//!
//! Provides:
//! - POST/GET /v1/events
//! - PUT/DELETE /v1/events/{event_id}
//! - PUT /v1/events/{event_id}/status
//! - PUT /v1/events/{event_id}/keepers
//! - PUT /v1/events/{event_id}/entries/{entry_id}/in|out
//! - DELETE /v1/entries/{entry_id}
//! - PUT /v1/entries/{entry_id}/status
//! - DELETE /v1/entries/{entry_id}/keepers/{keeper_id}
//! - GET /v1/keepers/{keeper_id}/events

use std::str::FromStr;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use checkin_id::{EntryId, EventId, UserId};
use checkin_model::{EntryStatus, EventPatch, EventStatus, NewEvent};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::authz::{self, ADMIN, STAFF};
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::api::response::ApiResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route("/events/{event_id}", put(update_event).delete(delete_event))
        .route("/events/{event_id}/status", put(set_event_status))
        .route("/events/{event_id}/keepers", put(assign_keeper))
        .route("/events/{event_id}/entries/{entry_id}/in", put(increment_in))
        .route("/events/{event_id}/entries/{entry_id}/out", put(increment_out))
        .route("/entries/{entry_id}", delete(remove_entry))
        .route("/entries/{entry_id}/status", put(set_entry_status))
        .route("/entries/{entry_id}/keepers/{keeper_id}", delete(remove_keeper))
        .route("/keepers/{keeper_id}/events", get(events_for_keeper))
}

// =============================================================================
// Request Types
// =============================================================================

/// Numeric fields accept JSON numbers and numeric strings. Negative values
/// floor at zero, fractions truncate, anything else is `None`.
fn lenient_u32(value: Option<&Value>) -> Option<u32> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.clamp(0.0, f64::from(u32::MAX)) as u32)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    venue: String,
    max_participants: Option<Value>,
    alert_point: Option<Value>,
    number_of_entries: Option<Value>,
}

impl From<CreateEventRequest> for NewEvent {
    fn from(req: CreateEventRequest) -> Self {
        NewEvent {
            title: req.title,
            venue: req.venue,
            max_participants: lenient_u32(req.max_participants.as_ref()).unwrap_or(0),
            alert_point: lenient_u32(req.alert_point.as_ref()).unwrap_or(0),
            number_of_entries: lenient_u32(req.number_of_entries.as_ref()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEventRequest {
    title: Option<String>,
    venue: Option<String>,
    max_participants: Option<Value>,
    alert_point: Option<Value>,
    number_of_entries: Option<Value>,
    description: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl From<UpdateEventRequest> for EventPatch {
    fn from(req: UpdateEventRequest) -> Self {
        EventPatch {
            title: req.title,
            venue: req.venue,
            max_participants: lenient_u32(req.max_participants.as_ref()),
            alert_point: lenient_u32(req.alert_point.as_ref()),
            number_of_entries: lenient_u32(req.number_of_entries.as_ref()),
            description: req.description,
            start_time: req.start_time,
            end_time: req.end_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventStatusRequest {
    status: String,
}

#[derive(Debug, Deserialize)]
struct EntryStatusRequest {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignKeeperRequest {
    #[serde(default)]
    email: String,
    id_keeper: Option<String>,
}

// =============================================================================
// Path parsing
// =============================================================================

fn parse_id<T: FromStr>(raw: &str, kind: &str, request_id: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::bad_request(
            format!("invalid_{kind}_id"),
            format!("Invalid {kind} ID format"),
        )
        .with_request_id(request_id)
    })
}

fn parse_event_status(raw: &str, request_id: &str) -> Result<EventStatus, ApiError> {
    serde_json::from_value(Value::String(raw.trim().to_lowercase())).map_err(|_| {
        ApiError::bad_request(
            "invalid_status",
            "Status must be one of scheduled, ongoing, completed, cancelled",
        )
        .with_request_id(request_id)
    })
}

fn parse_entry_status(raw: &str, request_id: &str) -> Result<EntryStatus, ApiError> {
    serde_json::from_value(Value::String(raw.trim().to_lowercase())).map_err(|_| {
        ApiError::bad_request("invalid_status", "Status must be open or close")
            .with_request_id(request_id)
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /v1/events
async fn create_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<CreateEventRequest>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;

    let events = state
        .engine()
        .create_event(req.into())
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::created(
        request_id,
        "Event created successfully",
        json!({ "events": events }),
    ))
}

/// GET /v1/events
async fn list_events(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;

    let events = state
        .engine()
        .list_events()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id,
        "Events retrieved successfully",
        json!({ "events": events }),
    ))
}

/// PUT /v1/events/{event_id}
async fn update_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;
    let event_id: EventId = parse_id(&event_id, "event", &request_id)?;

    let events = state
        .engine()
        .update_event(event_id, req.into())
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id,
        "Event updated successfully",
        json!({ "events": events }),
    ))
}

/// DELETE /v1/events/{event_id}
async fn delete_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;
    let event_id: EventId = parse_id(&event_id, "event", &request_id)?;

    let event_id = state
        .engine()
        .delete_event(event_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id,
        "Event deleted successfully",
        json!({ "eventId": event_id }),
    ))
}

/// PUT /v1/events/{event_id}/status
async fn set_event_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
    Json(req): Json<EventStatusRequest>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;
    let event_id: EventId = parse_id(&event_id, "event", &request_id)?;
    let status = parse_event_status(&req.status, &request_id)?;

    let event = state
        .engine()
        .set_event_status(event_id, status)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id,
        "Event status updated successfully",
        json!({ "event": event }),
    ))
}

/// PUT /v1/events/{event_id}/keepers
async fn assign_keeper(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
    Json(req): Json<AssignKeeperRequest>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;
    let event_id: EventId = parse_id(&event_id, "event", &request_id)?;
    let keeper_id: Option<UserId> = req
        .id_keeper
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| parse_id(id, "keeper", &request_id))
        .transpose()?;

    let event = state
        .engine()
        .assign_or_update_keeper(event_id, &req.email, keeper_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    let message = if keeper_id.is_some() {
        "Door-keeper updated successfully"
    } else {
        "Door-keeper assigned successfully"
    };
    Ok(ApiResponse::ok(request_id, message, json!({ "event": event })))
}

/// PUT /v1/events/{event_id}/entries/{entry_id}/in
async fn increment_in(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((event_id, entry_id)): Path<(String, String)>,
) -> Result<ApiResponse, ApiError> {
    let actor = authz::require_role(&ctx, STAFF)?;
    let request_id = &ctx.request_id;
    let event_id: EventId = parse_id(&event_id, "event", request_id)?;
    let entry_id: EntryId = parse_id(&entry_id, "entry", request_id)?;

    let entry = state
        .engine()
        .increment_in(actor, event_id, entry_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id.clone(),
        "Guest checked in",
        json!({ "entry": entry }),
    ))
}

/// PUT /v1/events/{event_id}/entries/{entry_id}/out
async fn increment_out(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((event_id, entry_id)): Path<(String, String)>,
) -> Result<ApiResponse, ApiError> {
    let actor = authz::require_role(&ctx, STAFF)?;
    let request_id = &ctx.request_id;
    let event_id: EventId = parse_id(&event_id, "event", request_id)?;
    let entry_id: EntryId = parse_id(&entry_id, "entry", request_id)?;

    let entry = state
        .engine()
        .increment_out(actor, event_id, entry_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id.clone(),
        "Guest checked out",
        json!({ "entry": entry }),
    ))
}

/// DELETE /v1/entries/{entry_id}
async fn remove_entry(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(entry_id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;
    let entry_id: EntryId = parse_id(&entry_id, "entry", &request_id)?;

    let event = state
        .engine()
        .remove_entry(entry_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id,
        "Entry removed successfully",
        json!({ "event": event }),
    ))
}

/// PUT /v1/entries/{entry_id}/status
async fn set_entry_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(entry_id): Path<String>,
    Json(req): Json<EntryStatusRequest>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;
    let entry_id: EntryId = parse_id(&entry_id, "entry", &request_id)?;
    let status = parse_entry_status(&req.status, &request_id)?;

    let event = state
        .engine()
        .set_entry_status(entry_id, status)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id,
        "Entry status updated successfully",
        json!({ "event": event }),
    ))
}

/// DELETE /v1/entries/{entry_id}/keepers/{keeper_id}
async fn remove_keeper(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((entry_id, keeper_id)): Path<(String, String)>,
) -> Result<ApiResponse, ApiError> {
    authz::require_role(&ctx, ADMIN)?;
    let request_id = ctx.request_id;
    let entry_id: EntryId = parse_id(&entry_id, "entry", &request_id)?;
    let keeper_id: UserId = parse_id(&keeper_id, "keeper", &request_id)?;

    let event = state
        .engine()
        .remove_keeper(entry_id, keeper_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    Ok(ApiResponse::ok(
        request_id,
        "Door-keeper removed successfully",
        json!({ "event": event }),
    ))
}

/// GET /v1/keepers/{keeper_id}/events
async fn events_for_keeper(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(keeper_id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let actor = authz::require_role(&ctx, STAFF)?;
    let request_id = &ctx.request_id;
    let keeper_id: UserId = parse_id(&keeper_id, "keeper", request_id)?;

    let events = state
        .engine()
        .events_for_keeper(actor, keeper_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    let message = if events.is_empty() {
        "No events found for this keeper"
    } else {
        "Events retrieved successfully"
    };
    Ok(ApiResponse::ok(
        request_id.clone(),
        message,
        json!({ "events": events }),
    ))
}
