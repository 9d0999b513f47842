//! Account activation.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{UserEnvelope, Valid};
use crate::token::Scope;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(equal = 26, message = "Token must be 26 characters long."))]
    pub token: String,
}

/// Handler to activate a user with its activation token.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<UserEnvelope>> {
    let mut user = match state.tokens.resolve(Scope::Activation, &body.token).await {
        Ok(user) => user,
        Err(ServerError::NotFound) => {
            return Err(ServerError::field(
                "token",
                "invalid_token",
                "invalid or expired activation token",
            ));
        },
        Err(err) => return Err(err),
    };

    user.activated = true;
    state.users.update(&mut user).await?;
    state.tokens.revoke_all(user.id, Scope::Activation).await?;

    tracing::info!(user_id = user.id, "user activated");

    Ok(Json(UserEnvelope { user }))
}
