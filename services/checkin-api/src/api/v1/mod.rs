//! API v1 routes.

mod events;
mod live;
mod users;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/users", users::routes())
        .merge(events::routes())
        .merge(live::routes())
}
