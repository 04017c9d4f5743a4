//! # Database Module
//!
//! The [`Store`] trait is the persistence seam for every handler. Two
//! implementations exist: [`PgStore`] on PostgreSQL through a deadpool
//! connection pool, and [`MemoryStore`] for local runs and tests.

pub mod connection;
pub mod memory;
pub mod models;

use async_trait::async_trait;
use uuid::Uuid;

pub use connection::DatabaseConnection as PgStore;
pub use memory::MemoryStore;

use crate::auth::models::Role;
use models::{
    Category, CategoryInput, CityCount, Conversation, Listing, ListingChanges, ListingFilter,
    Location, LocationInput, Message, NewListing, NewUser, ProfileChanges, User,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was hit
    #[error("{0} already exists")]
    Duplicate(&'static str),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("unreadable row: {0:#}")]
    Decode(anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>>;
    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>>;
    /// Also removes the user's listings, favorites and conversations
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    // Categories
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn find_category(&self, id: Uuid) -> StoreResult<Option<Category>>;
    async fn insert_category(&self, input: CategoryInput) -> StoreResult<Category>;
    async fn update_category(&self, id: Uuid, input: CategoryInput) -> StoreResult<Option<Category>>;
    async fn delete_category(&self, id: Uuid) -> StoreResult<bool>;

    // Locations
    async fn list_locations(&self) -> StoreResult<Vec<Location>>;
    async fn find_location(&self, id: Uuid) -> StoreResult<Option<Location>>;
    async fn insert_location(&self, input: LocationInput) -> StoreResult<Location>;
    async fn update_location(&self, id: Uuid, input: LocationInput) -> StoreResult<Option<Location>>;
    async fn delete_location(&self, id: Uuid) -> StoreResult<bool>;

    // Listings
    async fn list_listings(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>>;
    async fn find_listing(&self, id: Uuid) -> StoreResult<Option<Listing>>;
    async fn listings_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Listing>>;
    async fn insert_listing(&self, owner_id: Uuid, listing: NewListing) -> StoreResult<Listing>;
    async fn update_listing(&self, id: Uuid, changes: ListingChanges) -> StoreResult<Option<Listing>>;
    /// Also removes favorites and conversations attached to the listing
    async fn delete_listing(&self, id: Uuid) -> StoreResult<bool>;
    /// Active listings per city, most first
    async fn city_counts(&self) -> StoreResult<Vec<CityCount>>;

    // Favorites
    async fn favorite_listings(&self, user_id: Uuid) -> StoreResult<Vec<Listing>>;
    /// Idempotent
    async fn add_favorite(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<()>;
    async fn remove_favorite(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<()>;

    // Conversations
    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;
    async fn find_conversation_for(&self, listing_id: Uuid, buyer_id: Uuid) -> StoreResult<Option<Conversation>>;
    async fn insert_conversation(&self, listing_id: Uuid, buyer_id: Uuid, seller_id: Uuid) -> StoreResult<Conversation>;
    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;
    /// Also bumps the conversation's `updated_at`
    async fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, content: String) -> StoreResult<Message>;
    /// Oldest first
    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;
    /// Marks messages not sent by `reader_id` as read; returns how many changed
    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> StoreResult<u64>;

    async fn health_check(&self) -> StoreResult<()>;
}
