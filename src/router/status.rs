//! Public instance status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::config::Configuration;

/// Structured status.
#[derive(Serialize)]
pub struct Status {
    status: &'static str,
    version: String,
    name: String,
}

/// Public server status.
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        status: "available",
        version: config.version().to_owned(),
        name: config.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::*;

    #[tokio::test]
    async fn test_status_handler() {
        let ctx = router::state();
        let app = app(ctx.state);

        let response =
            make_request(app, Method::GET, "/status.json", String::default(), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "available");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
