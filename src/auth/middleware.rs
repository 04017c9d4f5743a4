//! Authentication Middleware
//!
//! Axum middleware that turns a bearer token into an
//! [`AuthenticatedIdentity`] on the request, or rejects the request.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::auth::extract::extract_token;
use crate::auth::models::AuthenticatedIdentity;
use crate::error::ApiError;
use crate::server::AppState;

/// Authentication middleware that validates JWT tokens and injects the caller's identity
pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Rejects with `Unauthenticated` when no token is present, when the
    /// token does not verify, or when its subject is no longer in the store.
    /// The caller sees the same error in every case.
    pub async fn require_auth(
        State(state): State<AppState>,
        mut req: Request,
        next: Next,
    ) -> Result<Response, ApiError> {
        let Some(token) = extract_token(&state.token_sources, req.headers()) else {
            tracing::warn!("[AuthMiddleware] No token on {} {}", req.method(), req.uri());
            return Err(ApiError::Unauthenticated);
        };

        let claims = match state.jwt.verify(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!("[AuthMiddleware] Token rejected on {}: {}", req.uri(), e);
                return Err(ApiError::Unauthenticated);
            }
        };

        // Role and email come from the current record, not the claims, so
        // changes made after issuance apply immediately.
        let user = match state.store.find_user_by_id(claims.sub).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!("[AuthMiddleware] Token subject {} no longer exists", claims.sub);
                return Err(ApiError::Unauthenticated);
            }
            Err(e) => return Err(e.into()),
        };

        let identity = AuthenticatedIdentity {
            user_id: user.id,
            email: user.email,
            role: user.role,
        };
        tracing::debug!("[AuthMiddleware] Authenticated {} as {}", identity.user_id, identity.role);

        req.extensions_mut().insert(identity);

        Ok(next.run(req).await)
    }
}

/// Extension trait for reading the identity off a request
pub trait RequestAuthExt {
    fn auth_identity(&self) -> Option<&AuthenticatedIdentity>;

    fn require_auth(&self) -> Result<&AuthenticatedIdentity, ApiError> {
        self.auth_identity().ok_or(ApiError::Unauthenticated)
    }
}

impl RequestAuthExt for Parts {
    fn auth_identity(&self) -> Option<&AuthenticatedIdentity> {
        self.extensions.get::<AuthenticatedIdentity>()
    }
}

impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.require_auth().cloned()
    }
}
