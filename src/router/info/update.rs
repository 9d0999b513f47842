use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};

use super::{Body, ModuleInfoEnvelope};
use crate::AppState;
use crate::error::{Result, ServerError};
use crate::module_info::ModuleInfo;
use crate::router::{Valid, expected_version};
use crate::user::User;

/// Handler to replace every field of a course module.
pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Valid(body): Valid<Body>,
) -> Result<Json<ModuleInfoEnvelope<ModuleInfo>>> {
    let expected = expected_version(&headers)?;
    let mut module = state.modules.get(id).await?;

    if expected.is_some_and(|version| version != module.version) {
        return Err(ServerError::EditConflict);
    }

    module.module_name = body.module_name;
    module.module_duration = body.module_duration;
    module.exam_type = body.exam_type;

    state.modules.update(&mut module).await?;

    tracing::info!(
        module_id = id,
        updated_by = actor.id,
        version = module.version,
        "module updated"
    );

    Ok(Json(module.into()))
}
