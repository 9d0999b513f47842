//! Registration.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::mail::{self, Template};
use crate::router::{UserEnvelope, Valid};
use crate::token::Scope;
use crate::user::{Credential, User};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 500,
        message = "First name must be provided and not be more than 500 characters long."
    ))]
    pub fname: String,
    #[serde(default)]
    #[validate(length(
        max = 500,
        message = "Second name must not be more than 500 characters long."
    ))]
    pub sname: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 72,
        message = "Password must contain between 8 and 72 characters."
    ))]
    pub password: String,
}

/// Handler to create user.
///
/// The user starts deactivated. The activation token is only delivered by
/// mail. User and token are stored together, so a failed registration never
/// leaves the email taken.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<UserEnvelope>)> {
    let password = Credential::set(body.password, &state.pwd)?;
    let mut user = User::new(body.fname, body.sname, body.email, password);

    let token = state
        .tokens
        .issue_with_user(&mut user, state.config.token.activation_ttl(), Scope::Activation)
        .await?;

    mail::dispatch(
        Arc::clone(&state.mail),
        user.email.clone(),
        Template::UserWelcome,
        mail::activation_payload(&token),
    );

    tracing::info!(user_id = user.id, "user registered");

    Ok((StatusCode::ACCEPTED, Json(UserEnvelope { user })))
}
