//! HTTP API handlers and routing.

pub mod authz;
pub mod error;
mod health;
pub mod request_context;
pub mod response;
mod v1;

use axum::{
    http::{header, HeaderValue, Method, Request},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Stamps requests that arrive without `x-request-id` with a `req_` ULID.
#[derive(Debug, Clone, Copy, Default)]
struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = checkin_id::RequestId::new().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(Any);

    Router::new()
        // Health endpoints (no auth required)
        .merge(health::routes())
        .nest("/v1", v1::routes())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUlid))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{HmacCredentials, Pbkdf2Hasher};
    use crate::db::{MemoryEventStore, MemoryUserStore};
    use crate::notifier::{BroadcastHub, NotifierHandle};
    use crate::state::AuthSettings;

    fn router() -> Router {
        let state = AppState::new(
            Arc::new(MemoryEventStore::new()),
            Arc::new(MemoryUserStore::new()),
            BroadcastHub::new(8),
            NotifierHandle::new(),
            AuthSettings {
                credentials: Arc::new(HmacCredentials::new(b"router-test").unwrap()),
                passwords: Arc::new(Pbkdf2Hasher::new(10)),
                access_token_ttl: chrono::Duration::minutes(5),
                refresh_token_ttl: chrono::Duration::hours(1),
                admin_email: "admin@example.com".to_string(),
            },
        );
        create_router(state)
    }

    #[tokio::test]
    async fn test_readyz_with_memory_store() {
        let response = router()
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|id| id.starts_with("req_")));
    }

    #[tokio::test]
    async fn test_anonymous_request_gets_envelope() {
        let response = router()
            .oneshot(
                Request::get("/v1/events")
                    .header("x-request-id", "req-from-client")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 401);
        assert_eq!(body["code"], "unauthorized");
        assert_eq!(body["request_id"], "req-from-client");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let response = router()
            .oneshot(
                Request::get("/v1/events")
                    .header("authorization", "Bearer chk_nope.nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
