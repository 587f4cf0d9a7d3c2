//! Request-scoped context extracted from HTTP requests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use checkin_id::RequestId;

use crate::api::error::ApiError;
use crate::auth::{CredentialError, Subject, TokenKind};
use crate::state::AppState;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// `None` when the request carried no credentials.
    pub subject: Option<Subject>,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub fn request_id(headers: &HeaderMap) -> String {
    header_string(headers, REQUEST_ID_HEADER).unwrap_or_else(|| RequestId::new().to_string())
}

/// The bearer token, if an Authorization header is present.
///
/// Fails when the header is present but is not a non-empty Bearer token.
pub fn bearer_token(headers: &HeaderMap, request_id: &str) -> Result<Option<String>, ApiError> {
    let Some(auth_value) = header_string(headers, AUTHORIZATION_HEADER) else {
        return Ok(None);
    };

    let Some(token) = auth_value.trim().strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized(
            "invalid_authorization",
            "Authorization must be a Bearer token",
        )
        .with_request_id(request_id));
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized(
            "invalid_authorization",
            "Authorization Bearer token cannot be empty",
        )
        .with_request_id(request_id));
    }
    Ok(Some(token.to_string()))
}

/// Verify an access token and return who it speaks for.
pub fn authenticate(state: &AppState, token: &str, request_id: &str) -> Result<Subject, ApiError> {
    let claims = state.credentials().verify(token).map_err(|e| {
        let message = match e {
            CredentialError::Expired => "Token has expired",
            _ => "Invalid token",
        };
        tracing::debug!(error = %e, request_id = %request_id, "Rejected bearer token");
        ApiError::unauthorized("invalid_token", message).with_request_id(request_id)
    })?;

    if claims.kind != TokenKind::Access {
        return Err(
            ApiError::unauthorized("invalid_token", "An access token is required")
                .with_request_id(request_id),
        );
    }
    Ok(claims.subject())
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let request_id = request_id(&parts.headers);

        let subject = bearer_token(&parts.headers, &request_id)?
            .map(|token| authenticate(state, &token, &request_id))
            .transpose()?;

        Ok(Self {
            request_id,
            subject,
        })
    }
}
