//! Favorites, always scoped to the caller

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::models::AuthenticatedIdentity;
use crate::database::models::ListingView;
use crate::error::{ApiError, ApiResult};
use crate::routes::listings::listing_views;
use crate::routes::extract::{JsonBody, PathParam};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub listing_id: Uuid,
}

pub async fn list_favorites(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ListingView>>> {
    let listings = state.store.favorite_listings(identity.user_id).await?;
    Ok(Json(listing_views(state.store.as_ref(), listings).await?))
}

/// Adding a listing that is already a favorite is a no-op
pub async fn add_favorite(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<FavoriteRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if state.store.find_listing(request.listing_id).await?.is_none() {
        return Err(ApiError::NotFound("Listing"));
    }
    state
        .store
        .add_favorite(identity.user_id, request.listing_id)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Added to favorites" }))))
}

pub async fn remove_favorite(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(listing_id): PathParam<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .store
        .remove_favorite(identity.user_id, listing_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
