//! Stateful tokens: random plaintext given once to the client, SHA256 digest
//! kept in the store.
mod repository;

pub use repository::*;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::crypto::{self, CryptoError};
use crate::error::Result;
use crate::user::{User, UserRepository};

/// Purpose a token was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issued token.
///
/// Only `token` and `expiry` reach the client.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: String,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl Token {
    /// Draw a fresh token valid for `ttl` after `now`.
    pub fn generate(
        user_id: i64,
        ttl: Duration,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> std::result::Result<Self, CryptoError> {
        let plaintext = crypto::random_token()?;
        let hash = crypto::digest(&plaintext);

        Ok(Self {
            plaintext,
            hash,
            user_id,
            expiry: now + ttl,
            scope,
        })
    }
}

/// Issues, resolves and revokes tokens.
#[derive(Clone)]
pub struct TokenAuthority {
    tokens: Arc<dyn TokenRepository>,
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
}

impl TokenAuthority {
    /// Create a new [`TokenAuthority`].
    pub fn new(
        tokens: Arc<dyn TokenRepository>,
        users: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { tokens, users, clock }
    }

    /// Issue and store a new token for `user_id`.
    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: Scope) -> Result<Token> {
        let token = Token::generate(user_id, ttl, scope, self.clock.now())?;
        self.tokens.insert(&token).await?;

        tracing::debug!(user_id, %scope, expiry = %token.expiry, "token issued");
        Ok(token)
    }

    /// Store a new `user` together with its first token.
    ///
    /// Nothing is persisted if either write fails.
    pub async fn issue_with_user(
        &self,
        user: &mut User,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Token> {
        let mut token = Token::generate(0, ttl, scope, self.clock.now())?;
        self.users.insert_with_token(user, &mut token).await?;

        tracing::debug!(user_id = user.id, %scope, expiry = %token.expiry, "token issued");
        Ok(token)
    }

    /// Find the user owning `plaintext` for `scope`.
    ///
    /// Unknown, expired and wrong-scope tokens all end as
    /// [`ServerError::NotFound`](crate::error::ServerError::NotFound).
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<User> {
        let hash = crypto::digest(plaintext);
        self.users.get_for_token(scope, &hash, self.clock.now()).await
    }

    /// Remove every token of `scope` owned by `user_id`.
    pub async fn revoke_all(&self, user_id: i64, scope: Scope) -> Result<()> {
        self.tokens.delete_all_for_user(scope, user_id).await?;

        tracing::debug!(user_id, %scope, "tokens revoked");
        Ok(())
    }

    /// Swap every token of `scope` owned by `user_id` for a new one, in a
    /// single store operation.
    pub async fn reissue(&self, user_id: i64, ttl: Duration, scope: Scope) -> Result<Token> {
        let token = Token::generate(user_id, ttl, scope, self.clock.now())?;
        self.tokens.replace_all_for_user(&token).await?;

        tracing::debug!(user_id, %scope, expiry = %token.expiry, "token reissued");
        Ok(token)
    }
}
