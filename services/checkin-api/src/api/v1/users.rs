//! User account endpoints.
//!
//! Provides:
//! - POST /v1/users/register
//! - POST /v1/users/login
//! - POST /v1/users/refresh-token

use axum::{extract::State, routing::post, Json, Router};
use checkin_id::UserId;
use checkin_model::Role;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::api::response::ApiResponse;
use crate::auth::{Subject, TokenKind};
use crate::db::{DbError, NewUser, User};
use crate::engine::normalize_email;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

/// Public view of an account. Never includes the password digest.
#[derive(Debug, Serialize)]
struct UserResponse {
    id: UserId,
    name: String,
    email: String,
    role: Role,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in_seconds: i64,
}

fn issue_tokens(state: &AppState, user: &User) -> TokenPair {
    let subject = Subject {
        id: user.id,
        email: user.email.clone(),
        role: user.role,
    };
    let auth = state.auth();
    TokenPair {
        access_token: state
            .credentials()
            .sign(&subject, TokenKind::Access, auth.access_token_ttl),
        refresh_token: state
            .credentials()
            .sign(&subject, TokenKind::Refresh, auth.refresh_token_ttl),
        token_type: "Bearer",
        expires_in_seconds: auth.access_token_ttl.num_seconds(),
    }
}

// ============================================================================
// register
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<RegisterRequest>,
) -> Result<ApiResponse, ApiError> {
    let request_id = ctx.request_id;

    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request(
            "missing_fields",
            "Name, email and password are required",
        )
        .with_request_id(request_id));
    }
    if email.len() > 320 || !email.contains('@') {
        return Err(
            ApiError::bad_request("invalid_email", "Invalid email format")
                .with_request_id(request_id),
        );
    }

    let role = if email == normalize_email(&state.auth().admin_email) {
        Role::Admin
    } else {
        Role::Keeper
    };

    let new_user = NewUser {
        name,
        email,
        password_hash: state.passwords().hash(&req.password),
        role,
    };
    let user = state
        .user_store()
        .insert(new_user)
        .await
        .map_err(|e| match e {
            DbError::Duplicate(_) => {
                ApiError::conflict("email_taken", "A user with this email already exists")
                    .with_request_id(request_id.clone())
            }
            e => {
                tracing::error!(error = %e, request_id = %request_id, "Failed to create user");
                ApiError::internal("internal_error", "Failed to register user")
                    .with_request_id(request_id.clone())
            }
        })?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");
    Ok(ApiResponse::created(
        request_id,
        "User registered successfully",
        json!(UserResponse::from(&user)),
    ))
}

// ============================================================================
// login
// ============================================================================

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<LoginRequest>,
) -> Result<ApiResponse, ApiError> {
    let request_id = ctx.request_id;
    let invalid = || {
        ApiError::unauthorized("invalid_credentials", "Invalid email or password.")
            .with_request_id(request_id.clone())
    };

    let user = state
        .user_store()
        .find_by_email(&normalize_email(&req.email))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, request_id = %request_id, "Failed to load user");
            ApiError::internal("internal_error", "Failed to log in")
                .with_request_id(request_id.clone())
        })?
        .ok_or_else(invalid)?;

    if !state.passwords().verify(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    let tokens = issue_tokens(&state, &user);
    Ok(ApiResponse::ok(
        request_id.clone(),
        "Login successful",
        json!({
            "user": UserResponse::from(&user),
            "accessToken": tokens.access_token,
            "refreshToken": tokens.refresh_token,
            "tokenType": tokens.token_type,
            "expiresInSeconds": tokens.expires_in_seconds,
        }),
    ))
}

// ============================================================================
// refresh-token
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

async fn refresh_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<RefreshRequest>,
) -> Result<ApiResponse, ApiError> {
    let request_id = ctx.request_id;

    let Some(token) = req.refresh_token.filter(|t| !t.trim().is_empty()) else {
        return Err(
            ApiError::bad_request("missing_refresh_token", "Refresh token is required")
                .with_request_id(request_id),
        );
    };

    let claims = state
        .credentials()
        .verify(token.trim())
        .ok()
        .filter(|claims| claims.kind == TokenKind::Refresh)
        .ok_or_else(|| {
            ApiError::unauthorized("invalid_token", "Invalid or expired refresh token")
                .with_request_id(request_id.clone())
        })?;

    let user = state
        .user_store()
        .find_by_id(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, request_id = %request_id, "Failed to load user");
            ApiError::internal("internal_error", "Failed to refresh token")
                .with_request_id(request_id.clone())
        })?
        .ok_or_else(|| {
            ApiError::not_found("user_not_found", "User no longer exists")
                .with_request_id(request_id.clone())
        })?;

    let tokens = issue_tokens(&state, &user);
    Ok(ApiResponse::ok(request_id, "Token refreshed", json!(tokens)))
}
