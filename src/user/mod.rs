mod repository;

pub use repository::*;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::crypto::{CryptoError, PasswordManager};

/// Default role given on registration.
pub const DEFAULT_ROLE: &str = "user";

/// User as saved on database.
#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
    pub fname: String,
    pub sname: String,
    pub email: String,
    pub role: String,
    #[serde(skip)]
    pub password: Credential,
    pub activated: bool,
    pub version: i32,
}

impl User {
    /// Create a not-yet-persisted, not-activated [`User`].
    ///
    /// `id`, `created_at` and `version` are assigned by the store on insert.
    pub fn new(fname: String, sname: String, email: String, password: Credential) -> Self {
        Self {
            id: 0,
            created_at: DateTime::default(),
            updated_at: DateTime::default(),
            fname,
            sname,
            email,
            role: DEFAULT_ROLE.to_owned(),
            password,
            activated: false,
            version: 0,
        }
    }
}

/// Password state of a [`User`].
///
/// The plaintext only lives in memory between the request body and the
/// hashing step, and is wiped when dropped.
#[derive(Clone, Default)]
pub enum Credential {
    #[default]
    Unset,
    Pending(Zeroizing<String>),
    Hashed(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Unset => f.write_str("Unset"),
            Credential::Pending(_) => f.write_str("Pending(***)"),
            Credential::Hashed(_) => f.write_str("Hashed(***)"),
        }
    }
}

impl Credential {
    /// Wrap a plaintext password.
    pub fn pending(plaintext: impl Into<String>) -> Self {
        Credential::Pending(Zeroizing::new(plaintext.into()))
    }

    /// Hash `plaintext` into a [`Credential::Hashed`].
    pub fn set(plaintext: impl Into<String>, pwd: &PasswordManager) -> Result<Self, CryptoError> {
        Self::pending(plaintext).seal(pwd)
    }

    /// Hash a [`Credential::Pending`] plaintext. Other states are kept.
    pub fn seal(self, pwd: &PasswordManager) -> Result<Self, CryptoError> {
        match self {
            Credential::Pending(plaintext) => {
                Ok(Credential::Hashed(pwd.hash_password(plaintext.as_bytes())?))
            },
            other => Ok(other),
        }
    }

    /// Check `plaintext` against the stored hash.
    ///
    /// Only a [`Credential::Hashed`] can match.
    pub fn matches(&self, plaintext: &str, pwd: &PasswordManager) -> Result<bool, CryptoError> {
        match self {
            Credential::Hashed(hash) => pwd.verify_password(plaintext, hash),
            _ => Ok(false),
        }
    }

    /// Stored hash, if any.
    pub fn hash(&self) -> Option<&str> {
        match self {
            Credential::Hashed(hash) => Some(hash),
            _ => None,
        }
    }

    /// Hash to write into the store.
    ///
    /// # Panics
    ///
    /// Persisting a user without a hashed password is a programming error.
    pub(crate) fn persisted_hash(&self) -> &str {
        match self {
            Credential::Hashed(hash) => hash,
            _ => panic!("missing password hash for user"),
        }
    }
}
