//! Cryptogragic logics.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::config::Argon2 as ArgonConfig;

/// Entropy carried by a token plaintext.
pub const TOKEN_ENTROPY_BYTES: usize = 16;
/// Length of a base32 (unpadded) token plaintext.
pub const TOKEN_PLAINTEXT_LENGTH: usize = 26;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("stored password hash is corrupted")]
    CorruptedHash,
    #[error("random generator failure: {0}")]
    Random(#[from] rand::Error),
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    ///
    /// A wrong password is `Ok(false)`. A hash that can't be parsed or
    /// checked is an error.
    pub fn verify_password(&self, password: impl AsRef<[u8]>, phc_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(phc_hash).map_err(|_| CryptoError::CorruptedHash)?;

        match self.argon2().verify_password(password.as_ref(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(CryptoError::Argon2(err.to_string())),
        }
    }
}

/// Generate a token plaintext: 16 bytes from the OS generator, base32 encoded.
pub fn random_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;

    Ok(base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes))
}

/// Digest a token plaintext into SHA256.
pub fn digest(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) fn test_password_manager() -> PasswordManager {
    PasswordManager::new(Some(ArgonConfig {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .unwrap()
}
