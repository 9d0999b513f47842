//! Course-module metadata HTTP API. Activated bearer token required.
mod create;
mod delete;
mod get;
mod update;

use axum::routing::get;
use axum::{Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::middleware::require_activated_user;
use crate::module_info::ModuleInfo;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET` and `POST /v1/info`.
        .route("/v1/info", get(get::list).post(create::handler))
        // `GET`, `PUT` and `DELETE /v1/info/{id}`.
        .route(
            "/v1/info/{id}",
            get(get::handler)
                .put(update::handler)
                .delete(delete::handler),
        )
        .route_layer(middleware::from_fn_with_state(state, require_activated_user))
}

/// Every field of a module, used both on creation and replacement.
///
/// Missing fields fall back to empty values so that they are reported as
/// validation errors.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 500,
        message = "Module name must be provided and not be more than 500 characters long."
    ))]
    pub module_name: String,
    #[validate(range(min = 1, message = "Module duration must be a positive integer."))]
    pub module_duration: i32,
    #[validate(length(min = 1, message = "Exam type must be provided."))]
    pub exam_type: String,
}

/// `{"module_info": ...}` response body.
#[derive(Debug, Serialize)]
pub struct ModuleInfoEnvelope<T> {
    pub module_info: T,
}

impl From<ModuleInfo> for ModuleInfoEnvelope<ModuleInfo> {
    fn from(module_info: ModuleInfo) -> Self {
        Self { module_info }
    }
}
