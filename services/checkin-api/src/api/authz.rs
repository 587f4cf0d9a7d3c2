//! Authorization helpers (v1).
//!
//! Two roles: admins manage events and staff, keepers operate the entries
//! they staff. Per-event keeper scoping is enforced by the engine.

use checkin_model::Role;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::auth::Subject;

/// Event, entry and staff management.
pub const ADMIN: &[Role] = &[Role::Admin];

/// Counters, keeper event lists and live updates.
pub const STAFF: &[Role] = &[Role::Admin, Role::Keeper];

pub fn require_authenticated(ctx: &RequestContext) -> Result<&Subject, ApiError> {
    ctx.subject.as_ref().ok_or_else(|| {
        ApiError::unauthorized("unauthorized", "Missing or invalid Authorization token")
            .with_request_id(ctx.request_id.clone())
    })
}

/// The caller, if authenticated with one of `allowed`.
pub fn require_role<'a>(
    ctx: &'a RequestContext,
    allowed: &[Role],
) -> Result<&'a Subject, ApiError> {
    let subject = require_authenticated(ctx)?;
    if !allowed.contains(&subject.role) {
        return Err(ApiError::forbidden(
            "forbidden",
            "Insufficient permissions for this operation",
        )
        .with_request_id(ctx.request_id.clone()));
    }
    Ok(subject)
}
