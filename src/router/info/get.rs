use axum::Json;
use axum::extract::{Path, State};

use super::ModuleInfoEnvelope;
use crate::AppState;
use crate::error::Result;
use crate::module_info::ModuleInfo;

/// Handler returning every course module.
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<ModuleInfoEnvelope<Vec<ModuleInfo>>>> {
    let module_info = state.modules.list().await?;
    Ok(Json(ModuleInfoEnvelope { module_info }))
}

/// Handler returning one course module.
pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ModuleInfoEnvelope<ModuleInfo>>> {
    let module = state.modules.get(id).await?;
    Ok(Json(module.into()))
}
