use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::Result;
use crate::router::Message;
use crate::user::User;

pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<Message>> {
    state.modules.delete(id).await?;

    tracing::info!(module_id = id, deleted_by = actor.id, "module deleted");

    Ok(Json(Message {
        message: "module_info successfully deleted",
    }))
}
