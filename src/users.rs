use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::AppError;

/// Credential data submitted by the login form
///
/// Both fields are optional so that an empty form still deserializes and the
/// verifier gets to decide.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,

    /// Password in plaintext (only transmitted, never stored)
    #[serde(default)]
    pub password: String,
}

/// Decides whether submitted credentials open a session.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credentials: &Credentials) -> Result<bool, AppError>;
}

/// Accepts every login attempt.
///
/// Used when no users file is configured.
#[derive(Debug, Default)]
pub struct AcceptAll;

impl CredentialVerifier for AcceptAll {
    fn verify(&self, _credentials: &Credentials) -> Result<bool, AppError> {
        Ok(true)
    }
}

/// A registered user as stored in the users file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,
}

/// Verifies credentials against a JSON users file of argon2 hashes
///
/// The file maps usernames to [`User`] entries:
///
/// ```json
/// {"alice": {"username": "alice", "password_hash": "$argon2id$v=19$..."}}
/// ```
#[derive(Debug)]
pub struct UserFile {
    users: HashMap<String, User>,
}

impl UserFile {
    /// Read and parse the users file
    ///
    /// # Errors
    /// * `AppError::Storage` if the file cannot be read
    /// * `AppError::Serialization` if it is not a valid users map
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let contents = fs::read_to_string(path)?;
        let users: HashMap<String, User> = serde_json::from_str(&contents)?;
        Ok(UserFile { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for UserFile {
    fn verify(&self, credentials: &Credentials) -> Result<bool, AppError> {
        match self.users.get(&credentials.username) {
            Some(user) => verify_password(&credentials.password, &user.password_hash),
            None => Ok(false),
        }
    }
}

/// Hash a password using Argon2
///
/// Creates a PHC-format Argon2id hash with a random salt, suitable for the
/// `password_hash` field of the users file.
///
/// # Errors
/// * `AppError::Auth` if hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Auth(format!("password hashing failed: {}", e)))
}

/// Verify a password against a stored hash
///
/// # Errors
/// * `AppError::Auth` if the stored hash is malformed
fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Auth(format!("invalid password hash format: {}", e)))?;

    // A mismatch is a normal "no", not an error
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
