//! Users-related HTTP API. Activated bearer token required.
mod delete;
mod get;
mod update;

use axum::routing::get;
use axum::{Router, middleware};

use crate::AppState;
use crate::middleware::require_activated_user;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /v1/users` goes to `list`.
        .route("/v1/users", get(get::list))
        // `GET`, `PATCH` and `DELETE /v1/users/{id}`.
        .route(
            "/v1/users/{id}",
            get(get::handler)
                .patch(update::handler)
                .delete(delete::handler),
        )
        .route_layer(middleware::from_fn_with_state(state, require_activated_user))
}
