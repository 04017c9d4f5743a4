//! Router-level test harness: the real router over a `MemoryStore` and a
//! manual clock.

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, Method, Request, StatusCode, header};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::clock::ManualClock;
use crate::auth::extract::DEFAULT_TOKEN_HEADER;
use crate::auth::jwt::JwtService;
use crate::auth::models::Role;
use crate::config::{JwtConfig, UploadConfig};
use crate::database::models::{Category, CategoryInput, Listing, ListingType, NewListing, NewUser, User};
use crate::database::{MemoryStore, Store};
use crate::server::{AppState, router};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub jwt: Arc<JwtService>,
    pub clock: Arc<ManualClock>,
    pub uploads: Arc<UploadConfig>,
    _uploads_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_lifetime_ms(3_600_000)
    }

    pub fn with_lifetime_ms(lifetime_ms: i64) -> Self {
        Self::build(lifetime_ms, 1024 * 1024)
    }

    pub fn with_upload_limit(max_file_bytes: usize) -> Self {
        Self::build(3_600_000, max_file_bytes)
    }

    fn build(lifetime_ms: i64, max_file_bytes: usize) -> Self {
        let uploads_dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = JwtConfig::new(
            "integration-secret".to_string(),
            lifetime_ms,
            DEFAULT_TOKEN_HEADER.to_string(),
        )
        .unwrap();
        let jwt = JwtService::new(&config, clock.clone()).unwrap();
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            jwt,
            store.clone(),
            HeaderName::from_static(DEFAULT_TOKEN_HEADER),
            UploadConfig::new(uploads_dir.path().join("images"), "/api/uploads/images/", max_file_bytes),
        );
        let jwt = state.jwt.clone();
        let uploads = state.uploads.clone();

        Self {
            router: router(state),
            store,
            jwt,
            clock,
            uploads,
            _uploads_dir: uploads_dir,
        }
    }

    /// Inserts a user directly and signs a token for them
    pub async fn user(&self, email: &str, role: Role) -> (User, String) {
        let user = self
            .store
            .insert_user(NewUser {
                email: email.to_string(),
                password_hash: "unused".to_string(),
                role,
                first_name: Some(email.split('@').next().unwrap_or_default().to_string()),
                last_name: None,
                phone: None,
                agency_name: None,
            })
            .await
            .unwrap();
        let token = self.jwt.issue(&user).unwrap().token;
        (user, token)
    }

    pub async fn category(&self, name: &str) -> Category {
        self.store
            .insert_category(CategoryInput {
                name: name.to_string(),
                description: None,
            })
            .await
            .unwrap()
    }

    pub async fn listing(&self, owner: &User, category: &Category, city: &str) -> Listing {
        self.store
            .insert_listing(
                owner.id,
                NewListing {
                    title: format!("Apartment in {city}"),
                    description: Some("Bright, close to the tram".to_string()),
                    price: Decimal::from(450_000),
                    area: 48.0,
                    rooms: Some(2),
                    floor: Some("3".to_string()),
                    listing_type: ListingType::Sale,
                    category_id: category.id,
                    location_id: None,
                    city: Some(city.to_string()),
                    district: None,
                    image_urls: vec!["https://img.example.com/1.jpg".to_string()],
                },
            )
            .await
            .unwrap()
    }

    pub async fn listing_exists(&self, id: Uuid) -> bool {
        self.store.find_listing(id).await.unwrap().is_some()
    }

    /// JSON request with an optional bearer token
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn raw(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, bytes) = self.raw(request).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}
