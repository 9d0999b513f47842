//! Authentication token creation.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::token::{Scope, Token};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 72,
        message = "Password must contain between 8 and 72 characters."
    ))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub authentication_token: Token,
}

/// Handler to exchange credentials for an authentication token.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let user = match state.users.get_by_email(&body.email).await {
        Ok(user) => user,
        Err(ServerError::NotFound) => return Err(ServerError::InvalidCredentials),
        Err(err) => return Err(err),
    };

    if !user.password.matches(&body.password, &state.pwd)? {
        return Err(ServerError::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(user.id, state.config.token.authentication_ttl(), Scope::Authentication)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Response {
            authentication_token: token,
        }),
    ))
}
