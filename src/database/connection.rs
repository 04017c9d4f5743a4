// Database Connection Management
//
// PostgreSQL store on a deadpool connection pool over tokio-postgres.
// The expected schema is in sql/schema.sql.

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::auth::models::Role;
use crate::config::DatabaseConfig;
use crate::database::models::{
    Category, CategoryInput, CityCount, Conversation, FromRow, Listing, ListingChanges,
    ListingFilter, Location, LocationInput, Message, NewListing, NewUser, ProfileChanges, User,
};
use crate::database::{Store, StoreError, StoreResult};

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: Pool,
}

impl DatabaseConnection {
    /// Create a new database connection with the provided configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pg_config = tokio_postgres::Config::from_str(&config.url)
            .context("Failed to parse DATABASE_URL")?;
        let masked_host = format!(
            "{:?}:{:?}/{}",
            pg_config.get_hosts().first(),
            pg_config.get_ports().first(),
            pg_config.get_dbname().unwrap_or_default()
        );
        tracing::info!("🔌 Connecting to database: {}", masked_host);

        let tls_connector = TlsConnector::builder()
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(tls_connector);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, tls, mgr_config);

        let timeout = Some(Duration::from_secs(30));
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .context("Failed to create database pool")?;

        let client = pool
            .get()
            .await
            .context("Failed to get connection from pool")?;
        client
            .query("SELECT 1", &[])
            .await
            .context("Failed to test database connection")?;

        tracing::info!("✅ Database connection established successfully");

        Ok(Self { pool })
    }

    async fn query_opt<T: FromRow>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<Option<T>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql, params).await?;
        row.as_ref().map(decode).transpose()
    }

    async fn query_all<T: FromRow>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<Vec<T>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql, params).await?;
        rows.iter().map(decode).collect()
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StoreResult<u64> {
        let client = self.pool.get().await?;
        Ok(client.execute(sql, params).await?)
    }
}

fn decode<T: FromRow>(row: &Row) -> StoreResult<T> {
    T::from_row(row).map_err(StoreError::Decode)
}

/// Unique violations become `Duplicate(what)`
fn unique_violation(what: &'static str) -> impl FnOnce(tokio_postgres::Error) -> StoreError {
    move |err| {
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            StoreError::Duplicate(what)
        } else {
            StoreError::Postgres(err)
        }
    }
}

const LIST_LISTINGS: &str = "
    SELECT l.* FROM listings l
    LEFT JOIN locations loc ON loc.id = l.location_id
    WHERE l.status = 'ACTIVE'
      AND ($1::uuid IS NULL OR l.category_id = $1)
      AND ($2::uuid IS NULL OR l.location_id = $2)
      AND ($3::text IS NULL OR l.listing_type = $3)
      AND ($4::numeric IS NULL OR l.price >= $4)
      AND ($5::numeric IS NULL OR l.price <= $5)
      AND ($6::float8 IS NULL OR l.area >= $6)
      AND ($7::float8 IS NULL OR l.area <= $7)
      AND ($8::int4 IS NULL OR l.rooms >= $8)
      AND ($9::int4 IS NULL OR l.rooms <= $9)
      AND ($10::text IS NULL
           OR l.city ILIKE $10 ESCAPE '\\'
           OR loc.city ILIKE $10 ESCAPE '\\')
    ORDER BY l.created_at DESC";

/// `%needle%` with LIKE metacharacters in `needle` matched literally
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const UPDATE_LISTING: &str = "
    UPDATE listings SET
        title = $2, description = $3, price = $4, area = $5, rooms = $6, floor = $7,
        listing_type = $8, status = $9, category_id = $10, location_id = $11,
        city = $12, district = $13, image_urls = $14, updated_at = NOW()
    WHERE id = $1
    RETURNING *";

#[async_trait]
impl Store for DatabaseConnection {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.query_opt("SELECT * FROM users WHERE id = $1", &[&id]).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.query_opt("SELECT * FROM users WHERE lower(email) = lower($1)", &[&email])
            .await
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO users (id, email, password_hash, role, first_name, last_name, phone, agency_name)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING *",
                &[
                    &Uuid::new_v4(),
                    &user.email,
                    &user.password_hash,
                    &user.role.as_str(),
                    &user.first_name,
                    &user.last_name,
                    &user.phone,
                    &user.agency_name,
                ],
            )
            .await
            .map_err(unique_violation("Email"))?;
        decode(&row)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.query_all("SELECT * FROM users ORDER BY created_at", &[]).await
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>> {
        self.query_opt(
            "UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone),
                avatar_url = COALESCE($5, avatar_url),
                agency_name = COALESCE($6, agency_name)
             WHERE id = $1
             RETURNING *",
            &[
                &id,
                &changes.first_name,
                &changes.last_name,
                &changes.phone,
                &changes.avatar_url,
                &changes.agency_name,
            ],
        )
        .await
    }

    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
        self.query_opt(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING *",
            &[&id, &role.as_str()],
        )
        .await
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.execute("DELETE FROM users WHERE id = $1", &[&id]).await? > 0)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.query_all("SELECT * FROM categories ORDER BY name", &[]).await
    }

    async fn find_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        self.query_opt("SELECT * FROM categories WHERE id = $1", &[&id]).await
    }

    async fn insert_category(&self, input: CategoryInput) -> StoreResult<Category> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO categories (id, name, description) VALUES ($1, $2, $3) RETURNING *",
                &[&Uuid::new_v4(), &input.name, &input.description],
            )
            .await
            .map_err(unique_violation("Category"))?;
        decode(&row)
    }

    async fn update_category(&self, id: Uuid, input: CategoryInput) -> StoreResult<Option<Category>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "UPDATE categories SET name = $2, description = $3 WHERE id = $1 RETURNING *",
                &[&id, &input.name, &input.description],
            )
            .await
            .map_err(unique_violation("Category"))?;
        row.as_ref().map(decode).transpose()
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.execute("DELETE FROM categories WHERE id = $1", &[&id]).await? > 0)
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        self.query_all("SELECT * FROM locations ORDER BY city, district", &[]).await
    }

    async fn find_location(&self, id: Uuid) -> StoreResult<Option<Location>> {
        self.query_opt("SELECT * FROM locations WHERE id = $1", &[&id]).await
    }

    async fn insert_location(&self, input: LocationInput) -> StoreResult<Location> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO locations (id, city, district, image_url) VALUES ($1, $2, $3, $4) RETURNING *",
                &[&Uuid::new_v4(), &input.city, &input.district, &input.image_url],
            )
            .await?;
        decode(&row)
    }

    async fn update_location(&self, id: Uuid, input: LocationInput) -> StoreResult<Option<Location>> {
        self.query_opt(
            "UPDATE locations SET city = $2, district = $3, image_url = $4 WHERE id = $1 RETURNING *",
            &[&id, &input.city, &input.district, &input.image_url],
        )
        .await
    }

    async fn delete_location(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.execute("DELETE FROM locations WHERE id = $1", &[&id]).await? > 0)
    }

    async fn list_listings(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>> {
        let listing_type = filter.listing_type.map(|t| t.as_str());
        let city = filter.city.as_deref().map(contains_pattern);
        self.query_all(
            LIST_LISTINGS,
            &[
                &filter.category_id,
                &filter.location_id,
                &listing_type,
                &filter.price_min,
                &filter.price_max,
                &filter.min_area,
                &filter.max_area,
                &filter.min_rooms,
                &filter.max_rooms,
                &city,
            ],
        )
        .await
    }

    async fn find_listing(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        self.query_opt("SELECT * FROM listings WHERE id = $1", &[&id]).await
    }

    async fn listings_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Listing>> {
        self.query_all(
            "SELECT * FROM listings WHERE owner_id = $1 ORDER BY created_at DESC",
            &[&owner_id],
        )
        .await
    }

    async fn insert_listing(&self, owner_id: Uuid, listing: NewListing) -> StoreResult<Listing> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO listings (id, owner_id, title, description, price, area, rooms, floor,
                                       listing_type, status, category_id, location_id, city, district, image_urls)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'ACTIVE', $10, $11, $12, $13, $14)
                 RETURNING *",
                &[
                    &Uuid::new_v4(),
                    &owner_id,
                    &listing.title,
                    &listing.description,
                    &listing.price,
                    &listing.area,
                    &listing.rooms,
                    &listing.floor,
                    &listing.listing_type.as_str(),
                    &listing.category_id,
                    &listing.location_id,
                    &listing.city,
                    &listing.district,
                    &listing.image_urls,
                ],
            )
            .await?;
        decode(&row)
    }

    async fn update_listing(&self, id: Uuid, changes: ListingChanges) -> StoreResult<Option<Listing>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let Some(row) = tx
            .query_opt("SELECT * FROM listings WHERE id = $1 FOR UPDATE", &[&id])
            .await?
        else {
            return Ok(None);
        };
        let mut listing: Listing = decode(&row)?;
        changes.apply(&mut listing);

        let row = tx
            .query_one(
                UPDATE_LISTING,
                &[
                    &id,
                    &listing.title,
                    &listing.description,
                    &listing.price,
                    &listing.area,
                    &listing.rooms,
                    &listing.floor,
                    &listing.listing_type.as_str(),
                    &listing.status.as_str(),
                    &listing.category_id,
                    &listing.location_id,
                    &listing.city,
                    &listing.district,
                    &listing.image_urls,
                ],
            )
            .await?;
        tx.commit().await?;
        decode(&row).map(Some)
    }

    async fn delete_listing(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.execute("DELETE FROM listings WHERE id = $1", &[&id]).await? > 0)
    }

    async fn city_counts(&self) -> StoreResult<Vec<CityCount>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT city, COUNT(*) AS count FROM listings
                 WHERE status = 'ACTIVE' AND city IS NOT NULL
                 GROUP BY city
                 ORDER BY count DESC, city ASC",
                &[],
            )
            .await?;
        rows.iter()
            .map(|row| -> StoreResult<CityCount> {
                Ok(CityCount {
                    name: row.try_get("city")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn favorite_listings(&self, user_id: Uuid) -> StoreResult<Vec<Listing>> {
        self.query_all(
            "SELECT l.* FROM listings l
             JOIN favorites f ON f.listing_id = l.id
             WHERE f.user_id = $1
             ORDER BY l.created_at DESC",
            &[&user_id],
        )
        .await
    }

    async fn add_favorite(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<()> {
        self.execute(
            "INSERT INTO favorites (user_id, listing_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            &[&user_id, &listing_id],
        )
        .await?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<()> {
        self.execute(
            "DELETE FROM favorites WHERE user_id = $1 AND listing_id = $2",
            &[&user_id, &listing_id],
        )
        .await?;
        Ok(())
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        self.query_opt("SELECT * FROM conversations WHERE id = $1", &[&id]).await
    }

    async fn find_conversation_for(&self, listing_id: Uuid, buyer_id: Uuid) -> StoreResult<Option<Conversation>> {
        self.query_opt(
            "SELECT * FROM conversations WHERE listing_id = $1 AND buyer_id = $2",
            &[&listing_id, &buyer_id],
        )
        .await
    }

    async fn insert_conversation(&self, listing_id: Uuid, buyer_id: Uuid, seller_id: Uuid) -> StoreResult<Conversation> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO conversations (id, listing_id, buyer_id, seller_id)
                 VALUES ($1, $2, $3, $4)
                 RETURNING *",
                &[&Uuid::new_v4(), &listing_id, &buyer_id, &seller_id],
            )
            .await
            .map_err(unique_violation("Conversation"))?;
        decode(&row)
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        self.query_all(
            "SELECT * FROM conversations
             WHERE buyer_id = $1 OR seller_id = $1
             ORDER BY updated_at DESC",
            &[&user_id],
        )
        .await
    }

    async fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, content: String) -> StoreResult<Message> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let row = tx
            .query_one(
                "INSERT INTO messages (id, conversation_id, sender_id, content)
                 VALUES ($1, $2, $3, $4)
                 RETURNING *",
                &[&Uuid::new_v4(), &conversation_id, &sender_id, &content],
            )
            .await?;
        tx.execute(
            "UPDATE conversations SET updated_at = NOW() WHERE id = $1",
            &[&conversation_id],
        )
        .await?;
        tx.commit().await?;
        decode(&row)
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        self.query_all(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
            &[&conversation_id],
        )
        .await
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> StoreResult<u64> {
        self.execute(
            "UPDATE messages SET is_read = TRUE
             WHERE conversation_id = $1 AND sender_id <> $2 AND NOT is_read",
            &[&conversation_id, &reader_id],
        )
        .await
    }

    async fn health_check(&self) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client.query("SELECT 1", &[]).await?;
        Ok(())
    }
}
