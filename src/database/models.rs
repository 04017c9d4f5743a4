// Database Models
//
// Records persisted by the store, the payloads that create or change them,
// and the outward JSON views. `FromRow` maps tokio-postgres rows onto records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::auth::models::Role;

/// Trait for converting from tokio-postgres Row
pub trait FromRow {
    fn from_row(row: &Row) -> Result<Self>
    where
        Self: Sized;
}

// ============================================================================
// USERS
// ============================================================================

/// User account. The password hash stays inside the server; see [`UserView`].
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub agency_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: role.parse().context("users.role holds an unknown value")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone: row.try_get("phone")?,
            avatar_url: row.try_get("avatar_url")?,
            agency_name: row.try_get("agency_name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub agency_name: Option<String>,
}

/// Self-service profile edit; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub agency_name: Option<String>,
}

/// Public shape of a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub agency_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            avatar_url: user.avatar_url.clone(),
            agency_name: user.agency_name.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

// ============================================================================
// CATEGORIES & LOCATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl FromRow for Category {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub city: String,
    pub district: Option<String>,
    pub image_url: Option<String>,
}

impl FromRow for Location {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            city: row.try_get("city")?,
            district: row.try_get("district")?,
            image_url: row.try_get("image_url")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    pub city: String,
    pub district: Option<String>,
    pub image_url: Option<String>,
}

// ============================================================================
// LISTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListingType {
    Sale,
    Rent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListingStatus {
    Active,
    Reserved,
    Sold,
    Expired,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => anyhow::bail!("unknown {} value: {}", stringify!($ty), other),
                }
            }
        }
    };
}

text_enum!(ListingType { Sale => "SALE", Rent => "RENT" });
text_enum!(ListingStatus {
    Active => "ACTIVE",
    Reserved => "RESERVED",
    Sold => "SOLD",
    Expired => "EXPIRED",
});

#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub area: f64,
    pub rooms: Option<i32>,
    pub floor: Option<String>,
    pub listing_type: ListingType,
    pub status: ListingStatus,
    pub category_id: Uuid,
    pub location_id: Option<Uuid>,
    pub city: Option<String>,
    pub district: Option<String>,
    /// First entry is the primary image
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for Listing {
    fn from_row(row: &Row) -> Result<Self> {
        let listing_type: String = row.try_get("listing_type")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            area: row.try_get("area")?,
            rooms: row.try_get("rooms")?,
            floor: row.try_get("floor")?,
            listing_type: listing_type.parse()?,
            status: status.parse()?,
            category_id: row.try_get("category_id")?,
            location_id: row.try_get("location_id")?,
            city: row.try_get("city")?,
            district: row.try_get("district")?,
            image_urls: row.try_get("image_urls")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Listing creation payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub area: f64,
    pub rooms: Option<i32>,
    pub floor: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub category_id: Uuid,
    pub location_id: Option<Uuid>,
    pub city: Option<String>,
    pub district: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Partial listing update. An absent field is left untouched. For the
/// nullable columns an explicit `null` clears the value. `image_urls:
/// Some(..)` replaces the whole image list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingChanges {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub area: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub rooms: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub floor: Option<Option<String>>,
    #[serde(rename = "type")]
    pub listing_type: Option<ListingType>,
    pub status: Option<ListingStatus>,
    pub category_id: Option<Uuid>,
    #[serde(default, deserialize_with = "nullable")]
    pub location_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub district: Option<Option<String>>,
    pub image_urls: Option<Vec<String>>,
}

/// Present fields become `Some`, so `null` arrives as `Some(None)`
fn nullable<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ListingChanges {
    pub fn apply(self, listing: &mut Listing) {
        if let Some(title) = self.title {
            listing.title = title;
        }
        if let Some(description) = self.description {
            listing.description = description;
        }
        if let Some(price) = self.price {
            listing.price = price;
        }
        if let Some(area) = self.area {
            listing.area = area;
        }
        if let Some(rooms) = self.rooms {
            listing.rooms = rooms;
        }
        if let Some(floor) = self.floor {
            listing.floor = floor;
        }
        if let Some(listing_type) = self.listing_type {
            listing.listing_type = listing_type;
        }
        if let Some(status) = self.status {
            listing.status = status;
        }
        if let Some(category_id) = self.category_id {
            listing.category_id = category_id;
        }
        if let Some(location_id) = self.location_id {
            listing.location_id = location_id;
        }
        if let Some(city) = self.city {
            listing.city = city;
        }
        if let Some(district) = self.district {
            listing.district = district;
        }
        if let Some(image_urls) = self.image_urls {
            listing.image_urls = image_urls;
        }
    }
}

/// Query-string filters for the public listing search
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilter {
    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub listing_type: Option<ListingType>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub min_rooms: Option<i32>,
    pub max_rooms: Option<i32>,
    /// Case-insensitive substring of the listing's city or of its linked
    /// location's city
    pub city: Option<String>,
}

impl ListingFilter {
    /// Search only ever returns ACTIVE listings
    pub fn matches(&self, listing: &Listing, location_city: Option<&str>) -> bool {
        listing.status == ListingStatus::Active
            && self.category_id.is_none_or(|id| listing.category_id == id)
            && self.location_id.is_none_or(|id| listing.location_id == Some(id))
            && self.listing_type.is_none_or(|t| listing.listing_type == t)
            && self.price_min.is_none_or(|min| listing.price >= min)
            && self.price_max.is_none_or(|max| listing.price <= max)
            && self.min_area.is_none_or(|min| listing.area >= min)
            && self.max_area.is_none_or(|max| listing.area <= max)
            && self.min_rooms.is_none_or(|min| listing.rooms.is_some_and(|r| r >= min))
            && self.max_rooms.is_none_or(|max| listing.rooms.is_some_and(|r| r <= max))
            && self.city.as_deref().is_none_or(|needle| {
                let needle = needle.to_lowercase();
                [listing.city.as_deref(), location_city]
                    .into_iter()
                    .flatten()
                    .any(|city| city.to_lowercase().contains(&needle))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CityCount {
    pub name: String,
    pub count: i64,
}

/// Public shape of a listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub area: f64,
    pub rooms: Option<i32>,
    pub floor: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub status: ListingStatus,
    pub user: Option<UserView>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub primary_image: Option<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// CONVERSATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    /// Owner of the listing at the time the conversation started
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for Conversation {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            listing_id: row.try_get("listing_id")?,
            buyer_id: row.try_get("buyer_id")?,
            seller_id: row.try_get("seller_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl FromRow for Message {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing() -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Flat".to_string(),
            description: Some("Quiet street".to_string()),
            price: Decimal::from(300_000),
            area: 40.0,
            rooms: Some(2),
            floor: Some("1".to_string()),
            listing_type: ListingType::Sale,
            status: ListingStatus::Active,
            category_id: Uuid::new_v4(),
            location_id: Some(Uuid::new_v4()),
            city: Some("Kraków".to_string()),
            district: Some("Podgórze".to_string()),
            image_urls: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_changes_distinguish_absent_from_null() {
        let changes: ListingChanges =
            serde_json::from_value(json!({ "locationId": null, "rooms": 4 })).unwrap();
        assert_eq!(changes.location_id, Some(None));
        assert_eq!(changes.rooms, Some(Some(4)));
        assert_eq!(changes.district, None);

        let mut target = listing();
        changes.apply(&mut target);
        assert_eq!(target.location_id, None);
        assert_eq!(target.rooms, Some(4));
        assert_eq!(target.district.as_deref(), Some("Podgórze"));
    }

    #[test]
    fn test_null_clears_text_fields() {
        let changes: ListingChanges =
            serde_json::from_value(json!({ "description": null, "floor": null, "city": null }))
                .unwrap();
        let mut target = listing();
        changes.apply(&mut target);
        assert_eq!(target.description, None);
        assert_eq!(target.floor, None);
        assert_eq!(target.city, None);
        assert_eq!(target.title, "Flat");
    }

    #[test]
    fn test_filter_skips_inactive_and_checks_location_city() {
        let filter = ListingFilter {
            city: Some("WARS".to_string()),
            ..Default::default()
        };
        let mut target = listing();
        target.city = None;
        assert!(filter.matches(&target, Some("Warszawa")));
        assert!(!filter.matches(&target, Some("Łódź")));
        assert!(!filter.matches(&target, None));

        target.status = ListingStatus::Reserved;
        assert!(!filter.matches(&target, Some("Warszawa")));
        assert!(!ListingFilter::default().matches(&target, None));
    }
}
