//! Auth routes for registration, login and logout

use axum::{Json, extract::State, http::StatusCode};

use crate::auth::models::{AuthResponse, AuthenticatedIdentity, LoginRequest, RegisterRequest, Role};
use crate::auth::password::{hash_password, verify_password, verify_unknown_account};
use crate::database::models::{NewUser, User, UserView};
use crate::error::{ApiError, ApiResult};
use crate::routes::extract::JsonBody;
use crate::server::AppState;

const MIN_PASSWORD_LEN: usize = 6;

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::Validation("A valid email is required".to_string()));
    }
    Ok(email)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn token_response(state: &AppState, user: &User) -> ApiResult<AuthResponse> {
    let issued = state
        .jwt
        .issue(user)
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(AuthResponse::new(issued.token, issued.expires_at, UserView::from(user)))
}

/// Self-registration. Supplying an agency name registers an AGENT; every
/// other account starts as USER. ADMIN is only ever granted by an admin.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email)?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("Email already in use".to_string()));
    }

    let password_hash = hash_password(&payload.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;

    let agency_name = non_blank(payload.agency_name);
    let role = if agency_name.is_some() { Role::Agent } else { Role::User };

    let user = state
        .store
        .insert_user(NewUser {
            email,
            password_hash,
            role,
            first_name: non_blank(payload.first_name),
            last_name: non_blank(payload.last_name),
            phone: non_blank(payload.phone),
            agency_name,
        })
        .await?;
    tracing::info!("Registered user {} as {}", user.id, user.role);

    Ok((StatusCode::CREATED, Json(token_response(&state, &user)?)))
}

/// Unknown email and wrong password get the same answer and cost the same
/// argon2 verification
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        verify_unknown_account(&payload.password);
        tracing::warn!("Login attempt for unknown email");
        return Err(ApiError::InvalidCredentials);
    };
    if !verify_password(&payload.password, &user.password_hash) {
        tracing::warn!("Failed login for user {}", user.id);
        return Err(ApiError::InvalidCredentials);
    }

    Ok(Json(token_response(&state, &user)?))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout(identity: AuthenticatedIdentity) -> StatusCode {
    tracing::info!("User {} logged out", identity.user_id);
    StatusCode::NO_CONTENT
}
