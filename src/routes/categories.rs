//! Category routes: public list, ADMIN-only writes

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use crate::auth::models::{AuthenticatedIdentity, Role};
use crate::auth::policy::require_role;
use crate::database::models::{Category, CategoryInput};
use crate::error::{ApiError, ApiResult};
use crate::routes::required_text;
use crate::routes::extract::{JsonBody, PathParam};
use crate::server::AppState;

fn clean(input: CategoryInput) -> Result<CategoryInput, ApiError> {
    Ok(CategoryInput {
        name: required_text(&input.name, "name")?,
        description: input.description,
    })
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.store.list_categories().await?))
}

pub async fn create_category(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CategoryInput>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    require_role(&identity, &[Role::Admin])?;
    let category = state.store.insert_category(clean(input)?).await?;
    tracing::info!("Category {} created by {}", category.name, identity.user_id);
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(input): JsonBody<CategoryInput>,
) -> ApiResult<Json<Category>> {
    require_role(&identity, &[Role::Admin])?;
    let category = state
        .store
        .update_category(id, clean(input)?)
        .await?
        .ok_or(ApiError::NotFound("Category"))?;
    Ok(Json(category))
}

/// Listings in the category go with it
pub async fn delete_category(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&identity, &[Role::Admin])?;
    if !state.store.delete_category(id).await? {
        return Err(ApiError::NotFound("Category"));
    }
    tracing::info!("Category {} deleted by {}", id, identity.user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::auth::models::Role;
    use crate::routes::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_only_admin_manages_categories() {
        let app = TestApp::new();
        let (_, agent_token) = app.user("agent@example.com", Role::Agent).await;
        let (_, admin_token) = app.user("admin@example.com", Role::Admin).await;
        let payload = json!({ "name": "Houses", "description": "Detached and terraced" });

        let (status, _) = app
            .call(Method::POST, "/api/categories", Some(&agent_token), Some(payload.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) = app
            .call(Method::POST, "/api/categories", Some(&admin_token), Some(payload.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "Houses");

        let (status, _) = app
            .call(Method::POST, "/api/categories", Some(&admin_token), Some(payload))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, listed) = app.call(Method::GET, "/api/categories", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let uri = format!("/api/categories/{}", created["id"].as_str().unwrap());
        let (status, renamed) = app
            .call(Method::PUT, &uri, Some(&admin_token), Some(json!({ "name": "Villas" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["name"], "Villas");

        let (status, _) = app.call(Method::DELETE, &uri, Some(&agent_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call(Method::DELETE, &uri, Some(&admin_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.call(Method::DELETE, &uri, Some(&admin_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deleting_category_removes_its_listings() {
        let app = TestApp::new();
        let (_, admin_token) = app.user("admin@example.com", Role::Admin).await;
        let (agent, _) = app.user("agent@example.com", Role::Agent).await;
        let category = app.category("Plots").await;
        let listing = app.listing(&agent, &category, "Lublin").await;

        let (status, _) = app
            .call(Method::DELETE, &format!("/api/categories/{}", category.id), Some(&admin_token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!app.listing_exists(listing.id).await);
    }
}
