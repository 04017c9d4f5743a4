//! Listing routes
//!
//! Reads are public. Creating a listing needs an AGENT or ADMIN token;
//! changing or removing one needs the owner's token or an ADMIN's.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::models::{AuthenticatedIdentity, Role};
use crate::auth::policy::{require_owner_or_admin, require_role};
use crate::database::models::{
    CityCount, Listing, ListingChanges, ListingFilter, ListingView, NewListing, UserView,
};
use crate::database::{Store, StoreResult};
use crate::error::{ApiError, ApiResult};
use crate::routes::required_text;
use crate::routes::extract::{JsonBody, PathParam, QueryParams};
use crate::server::AppState;

/// Resolves owners and category names for a batch of listings
pub(crate) async fn listing_views(
    store: &dyn Store,
    listings: Vec<Listing>,
) -> StoreResult<Vec<ListingView>> {
    let categories: HashMap<Uuid, String> = store
        .list_categories()
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut owners: HashMap<Uuid, Option<UserView>> = HashMap::new();
    for listing in &listings {
        if !owners.contains_key(&listing.owner_id) {
            let owner = store.find_user_by_id(listing.owner_id).await?;
            owners.insert(listing.owner_id, owner.as_ref().map(UserView::from));
        }
    }

    Ok(listings
        .into_iter()
        .map(|listing| ListingView {
            id: listing.id,
            user: owners.get(&listing.owner_id).cloned().flatten(),
            category: categories.get(&listing.category_id).cloned(),
            primary_image: listing.image_urls.first().cloned(),
            title: listing.title,
            description: listing.description,
            price: listing.price,
            area: listing.area,
            rooms: listing.rooms,
            floor: listing.floor,
            listing_type: listing.listing_type,
            status: listing.status,
            city: listing.city,
            district: listing.district,
            images: listing.image_urls,
            created_at: listing.created_at,
        })
        .collect())
}

async fn single_view(state: &AppState, listing: Listing) -> ApiResult<ListingView> {
    listing_views(state.store.as_ref(), vec![listing])
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("listing view went missing")))
}

fn check_amounts(price: Option<Decimal>, area: Option<f64>) -> Result<(), ApiError> {
    if price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(ApiError::Validation("Price cannot be negative".to_string()));
    }
    if area.is_some_and(|a| !a.is_finite() || a < 0.0) {
        return Err(ApiError::Validation("Area must be a non-negative number".to_string()));
    }
    Ok(())
}

/// Category must exist; location, when given, must exist too
async fn check_references(
    state: &AppState,
    category_id: Option<Uuid>,
    location_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(id) = category_id {
        if state.store.find_category(id).await?.is_none() {
            return Err(ApiError::Validation(format!("Unknown category {id}")));
        }
    }
    if let Some(id) = location_id {
        if state.store.find_location(id).await?.is_none() {
            return Err(ApiError::Validation(format!("Unknown location {id}")));
        }
    }
    Ok(())
}

pub async fn list_listings(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<ListingFilter>,
) -> ApiResult<Json<Vec<ListingView>>> {
    let listings = state.store.list_listings(&filter).await?;
    Ok(Json(listing_views(state.store.as_ref(), listings).await?))
}

pub async fn get_listing(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<ListingView>> {
    let listing = state
        .store
        .find_listing(id)
        .await?
        .ok_or(ApiError::NotFound("Listing"))?;
    Ok(Json(single_view(&state, listing).await?))
}

pub async fn city_counts(State(state): State<AppState>) -> ApiResult<Json<Vec<CityCount>>> {
    Ok(Json(state.store.city_counts().await?))
}

pub async fn my_listings(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ListingView>>> {
    let listings = state.store.listings_by_owner(identity.user_id).await?;
    Ok(Json(listing_views(state.store.as_ref(), listings).await?))
}

pub async fn create_listing(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    JsonBody(mut payload): JsonBody<NewListing>,
) -> ApiResult<(StatusCode, Json<ListingView>)> {
    require_role(&identity, &[Role::Agent, Role::Admin])?;

    payload.title = required_text(&payload.title, "title")?;
    check_amounts(Some(payload.price), Some(payload.area))?;
    check_references(&state, Some(payload.category_id), payload.location_id).await?;

    let listing = state.store.insert_listing(identity.user_id, payload).await?;
    tracing::info!("User {} created listing {}", identity.user_id, listing.id);

    Ok((StatusCode::CREATED, Json(single_view(&state, listing).await?)))
}

pub async fn update_listing(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(mut changes): JsonBody<ListingChanges>,
) -> ApiResult<Json<ListingView>> {
    let listing = state
        .store
        .find_listing(id)
        .await?
        .ok_or(ApiError::NotFound("Listing"))?;
    require_owner_or_admin(&identity, listing.owner_id)?;

    if let Some(title) = changes.title.as_deref() {
        changes.title = Some(required_text(title, "title")?);
    }
    check_amounts(changes.price, changes.area)?;
    check_references(&state, changes.category_id, changes.location_id.flatten()).await?;

    let listing = state
        .store
        .update_listing(id, changes)
        .await?
        .ok_or(ApiError::NotFound("Listing"))?;
    tracing::info!("User {} updated listing {}", identity.user_id, listing.id);

    Ok(Json(single_view(&state, listing).await?))
}

pub async fn delete_listing(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<StatusCode> {
    let listing = state
        .store
        .find_listing(id)
        .await?
        .ok_or(ApiError::NotFound("Listing"))?;
    require_owner_or_admin(&identity, listing.owner_id)?;

    if !state.store.delete_listing(id).await? {
        return Err(ApiError::NotFound("Listing"));
    }
    tracing::info!("User {} deleted listing {}", identity.user_id, id);
    Ok(StatusCode::NO_CONTENT)
}
