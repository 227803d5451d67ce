//! Password salting, hashing, and verification for password-gated locks
//!
//! Hashes use Argon2id with a per-lock random salt. The hash is stored as a
//! PHC string (algorithm, parameters, salt, and digest), with the salt kept
//! alongside it so a lock's password material can be inspected without
//! parsing the hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Stored password material for a lock: the PHC hash string and its salt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordMaterial {
    pub hash: String,
    pub salt: String,
}

/// A plaintext password held only for as long as an interaction is pending.
///
/// The buffer is zeroed on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Salts, hashes, and verifies lock passwords
#[derive(Clone)]
pub struct CredentialCodec {
    argon2: Argon2<'static>,
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

impl Default for CredentialCodec {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl CredentialCodec {
    /// Create a codec with explicit Argon2id cost parameters
    pub fn new(params: HashingParams) -> Result<Self> {
        let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| Error::InvalidConfiguration(format!("password_hashing: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Generate a fresh random salt (B64, 16 bytes of entropy)
    pub fn generate_salt(&self) -> String {
        SaltString::generate(&mut OsRng).as_str().to_string()
    }

    /// Hash `password` with `salt`; identical inputs always give identical output
    pub fn hash(&self, password: &str, salt: &str) -> Result<String> {
        let salt = SaltString::from_b64(salt)
            .map_err(|e| Error::InvalidInput(format!("malformed salt: {}", e)))?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::InvalidInput(format!("password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Generate a salt and hash `password` with it
    pub fn seal(&self, password: &str) -> Result<PasswordMaterial> {
        let salt = self.generate_salt();
        let hash = self.hash(password, &salt)?;
        Ok(PasswordMaterial { hash, salt })
    }

    /// Check `password` against a stored hash and salt.
    ///
    /// The digest comparison inside the verifier is constant time. A stored
    /// hash that embeds a different salt never verifies.
    pub fn verify(&self, password: &str, salt: &str, expected_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(expected_hash)
            .map_err(|e| Error::Parse(format!("password hash: {}", e)))?;

        if parsed.salt.map(|s| s.as_str()) != Some(salt) {
            return Ok(false);
        }

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Parse(format!("password hash: {}", e))),
        }
    }

    /// Verify against a lock's stored material
    pub fn verify_material(&self, password: &str, material: &PasswordMaterial) -> Result<bool> {
        self.verify(password, &material.salt, &material.hash)
    }
}

#[cfg(test)]
pub(crate) fn test_codec() -> CredentialCodec {
    // Cheap parameters so tests that hash repeatedly stay fast
    CredentialCodec::new(HashingParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .expect("valid test params")
}
