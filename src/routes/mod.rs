// # Routes Module
//
// HTTP handlers grouped by resource. Routes are registered in `server.rs`;
// handlers behind the auth middleware take an `AuthenticatedIdentity`
// argument and run the authorization checks from `auth::policy` before
// touching the store.

/// Health check and monitoring endpoints
pub mod health;

/// Registration, login, logout
pub mod auth;

pub mod categories;
pub mod conversations;
pub mod extract;
pub mod favorites;
pub mod listings;
pub mod locations;
pub mod uploads;
pub mod users;

#[cfg(test)]
pub mod test_support;

use crate::error::ApiError;

/// Trimmed, non-empty text or a validation error naming `field`
fn required_text(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}
