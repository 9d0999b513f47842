pub mod activate;
pub mod create;
pub mod info;
pub mod login;
pub mod status;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::http::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::user::User;

/// Optional header carrying the version the client last read.
pub const EXPECTED_VERSION: &str = "X-Expected-Version";

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Version sent in [`EXPECTED_VERSION`], if any.
///
/// A header that is not an integer is a validation error, never a conflict.
pub fn expected_version(headers: &HeaderMap) -> Result<Option<i32>> {
    let Some(value) = headers.get(EXPECTED_VERSION) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .map(Some)
        .ok_or_else(|| {
            ServerError::field(EXPECTED_VERSION, "invalid_version", "Version must be an integer.")
        })
}

/// `{"user": ...}` response body.
#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: User,
}

/// `{"message": ...}` response body.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

#[cfg(test)]
pub(crate) struct TestContext {
    pub state: crate::AppState,
    pub store: std::sync::Arc<crate::database::memory::MemoryStore>,
    pub clock: std::sync::Arc<crate::clock::FixedClock>,
    pub mail: std::sync::Arc<crate::mail::RecordingMailer>,
}

/// Application state backed by in-memory adapters.
#[cfg(test)]
pub(crate) fn state() -> TestContext {
    use std::sync::Arc;

    use crate::clock::FixedClock;
    use crate::database::memory::MemoryStore;
    use crate::mail::RecordingMailer;
    use crate::token::TokenAuthority;

    let clock = Arc::new(FixedClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let mail = Arc::new(RecordingMailer::default());

    let state = crate::AppState {
        config: Arc::new(crate::config::Configuration::default()),
        users: store.clone(),
        tokens: TokenAuthority::new(store.clone(), store.clone(), clock.clone()),
        pwd: Arc::new(crate::crypto::test_password_manager()),
        modules: store.clone(),
        mail: mail.clone(),
        clock: clock.clone(),
    };

    TestContext {
        state,
        store,
        clock,
        mail,
    }
}

#[cfg(test)]
impl TestContext {
    /// Register, activate and log in a user. Returns its id and bearer token.
    pub async fn activated_user(&self, email: &str) -> (i64, String) {
        use crate::token::Scope;
        use crate::user::{Credential, User, UserRepository};

        let mut user = User::new(
            "Katherine".into(),
            "Johnson".into(),
            email.into(),
            Credential::pending("pa55word-long").seal(&self.state.pwd).unwrap(),
        );
        user.activated = true;
        self.state.users.insert(&mut user).await.unwrap();

        let token = self
            .state
            .tokens
            .issue(user.id, chrono::Duration::hours(1), Scope::Authentication)
            .await
            .unwrap();
        (user.id, token.plaintext)
    }
}
