//! Location routes: public list, ADMIN-only writes

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use crate::auth::models::{AuthenticatedIdentity, Role};
use crate::auth::policy::require_role;
use crate::database::models::{Location, LocationInput};
use crate::error::{ApiError, ApiResult};
use crate::routes::required_text;
use crate::routes::extract::{JsonBody, PathParam};
use crate::server::AppState;

fn clean(input: LocationInput) -> Result<LocationInput, ApiError> {
    Ok(LocationInput {
        city: required_text(&input.city, "city")?,
        district: input.district.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        image_url: input.image_url,
    })
}

pub async fn list_locations(State(state): State<AppState>) -> ApiResult<Json<Vec<Location>>> {
    Ok(Json(state.store.list_locations().await?))
}

pub async fn create_location(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LocationInput>,
) -> ApiResult<(StatusCode, Json<Location>)> {
    require_role(&identity, &[Role::Admin])?;
    let location = state.store.insert_location(clean(input)?).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn update_location(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(input): JsonBody<LocationInput>,
) -> ApiResult<Json<Location>> {
    require_role(&identity, &[Role::Admin])?;
    let location = state
        .store
        .update_location(id, clean(input)?)
        .await?
        .ok_or(ApiError::NotFound("Location"))?;
    Ok(Json(location))
}

/// Listings keep their city text but lose the location link
pub async fn delete_location(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&identity, &[Role::Admin])?;
    if !state.store.delete_location(id).await? {
        return Err(ApiError::NotFound("Location"));
    }
    tracing::info!("Location {} deleted by {}", id, identity.user_id);
    Ok(StatusCode::NO_CONTENT)
}
