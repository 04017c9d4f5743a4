//! In-process store used when no `DATABASE_URL` is configured, and by tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::auth::models::Role;
use crate::database::models::{
    Category, CategoryInput, CityCount, Conversation, Listing, ListingChanges, ListingFilter,
    ListingStatus, Location, LocationInput, Message, NewListing, NewUser, ProfileChanges, User,
};
use crate::database::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    locations: HashMap<Uuid, Location>,
    listings: HashMap<Uuid, Listing>,
    favorites: HashSet<(Uuid, Uuid)>,
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
}

impl Tables {
    fn drop_listing(&mut self, listing_id: Uuid) -> bool {
        if self.listings.remove(&listing_id).is_none() {
            return false;
        }
        self.favorites.retain(|(_, listing)| *listing != listing_id);
        let orphaned: HashSet<Uuid> = self
            .conversations
            .values()
            .filter(|c| c.listing_id == listing_id)
            .map(|c| c.id)
            .collect();
        self.drop_conversations(&orphaned);
        true
    }

    fn drop_conversations(&mut self, ids: &HashSet<Uuid>) {
        self.conversations.retain(|id, _| !ids.contains(id));
        self.messages.retain(|m| !ids.contains(&m.conversation_id));
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut listings: Vec<Listing>) -> Vec<Listing> {
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    listings
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write();
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Duplicate("Email"));
        }
        let record = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            avatar_url: None,
            agency_name: user.agency_name,
            created_at: Utc::now(),
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write();
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = changes.first_name {
            user.first_name = Some(v);
        }
        if let Some(v) = changes.last_name {
            user.last_name = Some(v);
        }
        if let Some(v) = changes.phone {
            user.phone = Some(v);
        }
        if let Some(v) = changes.avatar_url {
            user.avatar_url = Some(v);
        }
        if let Some(v) = changes.agency_name {
            user.agency_name = Some(v);
        }
        Ok(Some(user.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write();
        Ok(tables.users.get_mut(&id).map(|user| {
            user.role = role;
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<Uuid> = tables
            .listings
            .values()
            .filter(|l| l.owner_id == id)
            .map(|l| l.id)
            .collect();
        for listing_id in owned {
            tables.drop_listing(listing_id);
        }
        tables.favorites.retain(|(user, _)| *user != id);
        let involved: HashSet<Uuid> = tables
            .conversations
            .values()
            .filter(|c| c.buyer_id == id || c.seller_id == id)
            .map(|c| c.id)
            .collect();
        tables.drop_conversations(&involved);
        Ok(true)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<Category> = self.tables.read().categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.tables.read().categories.get(&id).cloned())
    }

    async fn insert_category(&self, input: CategoryInput) -> StoreResult<Category> {
        let mut tables = self.tables.write();
        if tables.categories.values().any(|c| c.name == input.name) {
            return Err(StoreError::Duplicate("Category"));
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, input: CategoryInput) -> StoreResult<Option<Category>> {
        let mut tables = self.tables.write();
        if tables.categories.values().any(|c| c.id != id && c.name == input.name) {
            return Err(StoreError::Duplicate("Category"));
        }
        Ok(tables.categories.get_mut(&id).map(|category| {
            category.name = input.name;
            category.description = input.description;
            category.clone()
        }))
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        if !tables.categories.contains_key(&id) {
            return Ok(false);
        }
        let attached: Vec<Uuid> = tables
            .listings
            .values()
            .filter(|l| l.category_id == id)
            .map(|l| l.id)
            .collect();
        for listing_id in attached {
            tables.drop_listing(listing_id);
        }
        tables.categories.remove(&id);
        Ok(true)
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        let mut locations: Vec<Location> = self.tables.read().locations.values().cloned().collect();
        locations.sort_by(|a, b| a.city.cmp(&b.city).then(a.district.cmp(&b.district)));
        Ok(locations)
    }

    async fn find_location(&self, id: Uuid) -> StoreResult<Option<Location>> {
        Ok(self.tables.read().locations.get(&id).cloned())
    }

    async fn insert_location(&self, input: LocationInput) -> StoreResult<Location> {
        let location = Location {
            id: Uuid::new_v4(),
            city: input.city,
            district: input.district,
            image_url: input.image_url,
        };
        self.tables.write().locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn update_location(&self, id: Uuid, input: LocationInput) -> StoreResult<Option<Location>> {
        let mut tables = self.tables.write();
        Ok(tables.locations.get_mut(&id).map(|location| {
            location.city = input.city;
            location.district = input.district;
            location.image_url = input.image_url;
            location.clone()
        }))
    }

    async fn delete_location(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        if tables.locations.remove(&id).is_none() {
            return Ok(false);
        }
        for listing in tables.listings.values_mut() {
            if listing.location_id == Some(id) {
                listing.location_id = None;
            }
        }
        Ok(true)
    }

    async fn list_listings(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>> {
        let tables = self.tables.read();
        Ok(newest_first(
            tables
                .listings
                .values()
                .filter(|l| {
                    let location_city = l
                        .location_id
                        .and_then(|id| tables.locations.get(&id))
                        .map(|location| location.city.as_str());
                    filter.matches(l, location_city)
                })
                .cloned()
                .collect(),
        ))
    }

    async fn find_listing(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.tables.read().listings.get(&id).cloned())
    }

    async fn listings_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Listing>> {
        let tables = self.tables.read();
        Ok(newest_first(
            tables
                .listings
                .values()
                .filter(|l| l.owner_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn insert_listing(&self, owner_id: Uuid, listing: NewListing) -> StoreResult<Listing> {
        let now = Utc::now();
        let record = Listing {
            id: Uuid::new_v4(),
            owner_id,
            title: listing.title,
            description: listing.description,
            price: listing.price,
            area: listing.area,
            rooms: listing.rooms,
            floor: listing.floor,
            listing_type: listing.listing_type,
            status: ListingStatus::Active,
            category_id: listing.category_id,
            location_id: listing.location_id,
            city: listing.city,
            district: listing.district,
            image_urls: listing.image_urls,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().listings.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_listing(&self, id: Uuid, changes: ListingChanges) -> StoreResult<Option<Listing>> {
        let mut tables = self.tables.write();
        Ok(tables.listings.get_mut(&id).map(|listing| {
            changes.apply(listing);
            listing.updated_at = Utc::now();
            listing.clone()
        }))
    }

    async fn delete_listing(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().drop_listing(id))
    }

    async fn city_counts(&self) -> StoreResult<Vec<CityCount>> {
        let tables = self.tables.read();
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for listing in tables.listings.values() {
            if listing.status != ListingStatus::Active {
                continue;
            }
            if let Some(city) = listing.city.as_deref() {
                *counts.entry(city).or_default() += 1;
            }
        }
        let mut counts: Vec<CityCount> = counts
            .into_iter()
            .map(|(name, count)| CityCount {
                name: name.to_string(),
                count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        Ok(counts)
    }

    async fn favorite_listings(&self, user_id: Uuid) -> StoreResult<Vec<Listing>> {
        let tables = self.tables.read();
        Ok(newest_first(
            tables
                .favorites
                .iter()
                .filter(|(user, _)| *user == user_id)
                .filter_map(|(_, listing)| tables.listings.get(listing).cloned())
                .collect(),
        ))
    }

    async fn add_favorite(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<()> {
        self.tables.write().favorites.insert((user_id, listing_id));
        Ok(())
    }

    async fn remove_favorite(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<()> {
        self.tables.write().favorites.remove(&(user_id, listing_id));
        Ok(())
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.tables.read().conversations.get(&id).cloned())
    }

    async fn find_conversation_for(&self, listing_id: Uuid, buyer_id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self
            .tables
            .read()
            .conversations
            .values()
            .find(|c| c.listing_id == listing_id && c.buyer_id == buyer_id)
            .cloned())
    }

    async fn insert_conversation(&self, listing_id: Uuid, buyer_id: Uuid, seller_id: Uuid) -> StoreResult<Conversation> {
        let mut tables = self.tables.write();
        if tables
            .conversations
            .values()
            .any(|c| c.listing_id == listing_id && c.buyer_id == buyer_id)
        {
            return Err(StoreError::Duplicate("Conversation"));
        }
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            listing_id,
            buyer_id,
            seller_id,
            created_at: now,
            updated_at: now,
        };
        tables.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .tables
            .read()
            .conversations
            .values()
            .filter(|c| c.buyer_id == user_id || c.seller_id == user_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, content: String) -> StoreResult<Message> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        if let Some(conversation) = tables.conversations.get_mut(&conversation_id) {
            conversation.updated_at = now;
        }
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            is_read: false,
            created_at: now,
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        Ok(self
            .tables
            .read()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let mut changed = 0;
        for message in tables
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader_id && !m.is_read)
        {
            message.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
