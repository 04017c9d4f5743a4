//! Argon2 password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// Well-formed argon2id hash with the default cost parameters that no
/// password produces. Verifying against it costs the same as a real check.
const UNMATCHABLE_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$VQFgHfSH5Be6tuUrEF7j4oavAyaQgm5oNpx0Xk2NRP4";

/// Runs a full verification that always fails, so a login for an unknown
/// account takes as long as one with a wrong password
pub fn verify_unknown_account(password: &str) -> bool {
    verify_password(password, UNMATCHABLE_HASH)
}

/// False for a wrong password and for a hash that cannot be parsed
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}
