//! User account routes: own profile, and admin-only user management

use axum::{
    Json,
    extract::State,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::models::{AuthenticatedIdentity, Role};
use crate::auth::policy::{SelfAction, require_not_self, require_role};
use crate::database::models::{ProfileChanges, UserView};
use crate::error::{ApiError, ApiResult};
use crate::routes::extract::{JsonBody, PathParam};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: String,
}

pub async fn me(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
) -> ApiResult<Json<UserView>> {
    let user = state
        .store
        .find_user_by_id(identity.user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(UserView::from(&user)))
}

pub async fn update_me(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    JsonBody(changes): JsonBody<ProfileChanges>,
) -> ApiResult<Json<UserView>> {
    let user = state
        .store
        .update_profile(identity.user_id, changes)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(UserView::from(&user)))
}

pub async fn list_users(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<UserView>>> {
    require_role(&identity, &[Role::Admin])?;
    let users = state.store.list_users().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

/// Admin-only. An admin cannot change their own role, which also keeps at
/// least one admin in place once there is one.
pub async fn update_role(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(change): JsonBody<RoleChange>,
) -> ApiResult<Json<UserView>> {
    require_role(&identity, &[Role::Admin])?;
    require_not_self(&identity, id, SelfAction::ChangeRole)?;

    let role = change
        .role
        .parse::<Role>()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let user = state
        .store
        .set_role(id, role)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    tracing::info!("User {} changed role of {} to {}", identity.user_id, user.id, role);
    Ok(Json(UserView::from(&user)))
}

pub async fn delete_user(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Value>> {
    require_role(&identity, &[Role::Admin])?;
    require_not_self(&identity, id, SelfAction::DeleteAccount)?;

    if !state.store.delete_user(id).await? {
        return Err(ApiError::NotFound("User"));
    }
    tracing::info!("User {} deleted user {}", identity.user_id, id);
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use crate::auth::models::Role;
    use crate::database::Store;
    use crate::routes::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let app = TestApp::new();
        let (admin, token) = app.user("admin@example.com", Role::Admin).await;

        let (status, body) = app
            .call(Method::DELETE, &format!("/api/users/{}", admin.id), Some(&token), None)
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "SELF_ACTION_FORBIDDEN");
        assert_eq!(body["error"], "Cannot delete your own account");
        assert!(app.store.find_user_by_id(admin.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_admin_cannot_change_own_role() {
        let app = TestApp::new();
        let (admin, token) = app.user("admin@example.com", Role::Admin).await;

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/users/{}/role", admin.id),
                Some(&token),
                Some(json!({ "role": "USER" })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "SELF_ACTION_FORBIDDEN");
        let stored = app.store.find_user_by_id(admin.id).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_user_management_requires_admin() {
        let app = TestApp::new();
        let (_, agent_token) = app.user("agent@example.com", Role::Agent).await;
        let (target, _) = app.user("target@example.com", Role::User).await;

        let (status, body) = app.call(Method::GET, "/api/users", Some(&agent_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, _) = app
            .call(Method::DELETE, &format!("/api/users/{}", target.id), Some(&agent_token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(app.store.find_user_by_id(target.id).await.unwrap().is_some());

        let (status, body) = app.call(Method::GET, "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_role_change_applies_to_existing_token() {
        let app = TestApp::new();
        let (_, admin_token) = app.user("admin@example.com", Role::Admin).await;
        let (user, user_token) = app.user("promoted@example.com", Role::User).await;

        let (status, _) = app.call(Method::GET, "/api/users", Some(&user_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/users/{}/role", user.id),
                Some(&admin_token),
                Some(json!({ "role": "admin" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "ADMIN");

        let (status, body) = app.call(Method::GET, "/api/users", Some(&user_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_role_and_missing_user() {
        let app = TestApp::new();
        let (_, admin_token) = app.user("admin@example.com", Role::Admin).await;
        let (user, _) = app.user("someone@example.com", Role::User).await;

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/users/{}/role", user.id),
                Some(&admin_token),
                Some(json!({ "role": "ROOT" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let (status, _) = app
            .call(
                Method::DELETE,
                &format!("/api/users/{}", uuid::Uuid::new_v4()),
                Some(&admin_token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deleted_user_token_is_rejected() {
        let app = TestApp::new();
        let (_, admin_token) = app.user("admin@example.com", Role::Admin).await;
        let (user, user_token) = app.user("leaving@example.com", Role::User).await;

        let (status, body) = app
            .call(Method::DELETE, &format!("/api/users/{}", user.id), Some(&admin_token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User deleted successfully");

        let (status, _) = app.call(Method::GET, "/api/users/me", Some(&user_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_update() {
        let app = TestApp::new();
        let (_, token) = app.user("me@example.com", Role::User).await;

        let (status, body) = app
            .call(
                Method::PUT,
                "/api/users/me",
                Some(&token),
                Some(json!({ "phone": "+48 600 100 200", "lastName": "Nowak" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phone"], "+48 600 100 200");
        assert_eq!(body["lastName"], "Nowak");
        assert_eq!(body["firstName"], "me");
        assert_eq!(body["role"], "USER");
    }
}
