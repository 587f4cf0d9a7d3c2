//! Liveness and readiness checks.
//!
//! - GET /livez: the process answers
//! - GET /healthz: build identity, no dependency checks
//! - GET /readyz: checks the event store and reports live fan-out; 503 while
//!   events cannot be read, since every operation starts with a load

use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct Identity {
    service: &'static str,
    version: &'static str,
}

const IDENTITY: Identity = Identity {
    service: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
};

#[derive(Debug, Serialize)]
struct Readiness {
    ready: bool,
    #[serde(flatten)]
    identity: Identity,
    event_store: StoreCheck,
    live: LiveFanout,
}

#[derive(Debug, Serialize)]
struct StoreCheck {
    reachable: bool,
    latency_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct LiveFanout {
    subscribers: usize,
    buffer: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/livez", get(|| async { StatusCode::OK }))
        .route("/healthz", get(|| async { Json(IDENTITY) }))
        .route("/readyz", get(readyz))
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let started = Instant::now();
    let check = state.event_store().health_check().await;
    let event_store = StoreCheck {
        reachable: check.is_ok(),
        latency_ms: started.elapsed().as_millis(),
        error: check.err().map(|e| e.to_string()),
    };
    if let Some(error) = &event_store.error {
        tracing::warn!(error = %error, "Event store failed readiness check");
    }

    let report = Readiness {
        ready: event_store.reachable,
        identity: IDENTITY,
        event_store,
        live: LiveFanout {
            subscribers: state.hub().subscriber_count(),
            buffer: state.hub().capacity(),
        },
    };
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
