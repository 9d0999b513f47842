use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::{Extension, Json};

use super::{Body, ModuleInfoEnvelope};
use crate::AppState;
use crate::error::Result;
use crate::module_info::ModuleInfo;
use crate::router::Valid;
use crate::user::User;

/// Handler to create a course module.
pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<ModuleInfoEnvelope<ModuleInfo>>)> {
    let mut module = ModuleInfo::new(body.module_name, body.module_duration, body.exam_type);
    state.modules.insert(&mut module).await?;

    tracing::info!(module_id = module.id, created_by = actor.id, "module created");

    let location = format!("/v1/info/{}", module.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(module.into())))
}
