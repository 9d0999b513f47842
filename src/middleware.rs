//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::crypto::TOKEN_PLAINTEXT_LENGTH;
use crate::error::{Result, ServerError};
use crate::token::Scope;

const BEARER: &str = "Bearer ";

/// Resolve the bearer authentication token into an activated
/// [`User`](crate::user::User), stored in request extensions.
pub async fn require_activated_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .filter(|token| token.len() == TOKEN_PLAINTEXT_LENGTH)
        .map(str::to_owned)
        .ok_or(ServerError::Unauthorized)?;

    let user = match state.tokens.resolve(Scope::Authentication, &token).await {
        Ok(user) => user,
        Err(ServerError::NotFound) => return Err(ServerError::Unauthorized),
        Err(err) => return Err(err),
    };

    if !user.activated {
        return Err(ServerError::InactiveAccount);
    }

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
