//! # Server Module
//!
//! HTTP server setup and route configuration.

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::auth::clock::SystemClock;
use crate::auth::extract::{TokenSource, default_sources};
use crate::auth::jwt::JwtService;
use crate::auth::middleware::AuthMiddleware;
use crate::config::{Config, UploadConfig};
use crate::database::{MemoryStore, PgStore, Store};
use crate::error::ApiError;
use crate::routes::{
    auth, categories, conversations, favorites, health, listings, locations, uploads, users,
};

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub jwt: Arc<JwtService>,
    pub store: Arc<dyn Store>,
    /// Tried in order by the auth middleware
    pub token_sources: Arc<Vec<TokenSource>>,
    pub uploads: Arc<UploadConfig>,
}

impl AppState {
    pub fn new(
        jwt: JwtService,
        store: Arc<dyn Store>,
        token_header: HeaderName,
        uploads: UploadConfig,
    ) -> Self {
        Self {
            jwt: Arc::new(jwt),
            store,
            token_sources: Arc::new(default_sources(token_header)),
            uploads: Arc::new(uploads),
        }
    }
}

/// All routes. Everything in `protected` runs behind the auth middleware.
pub fn router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(uploads::request_limit(&state.uploads));

    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/users", get(users::list_users))
        .route("/api/users/me", get(users::me).put(users::update_me))
        .route("/api/users/{id}", delete(users::delete_user))
        .route("/api/users/{id}/role", put(users::update_role))
        .route("/api/listings", post(listings::create_listing))
        .route("/api/listings/my", get(listings::my_listings))
        .route(
            "/api/listings/{id}",
            put(listings::update_listing).delete(listings::delete_listing),
        )
        .route("/api/categories", post(categories::create_category))
        .route(
            "/api/categories/{id}",
            put(categories::update_category).delete(categories::delete_category),
        )
        .route("/api/locations", post(locations::create_location))
        .route(
            "/api/locations/{id}",
            put(locations::update_location).delete(locations::delete_location),
        )
        .route(
            "/api/favorites",
            get(favorites::list_favorites).post(favorites::add_favorite),
        )
        .route("/api/favorites/{listing_id}", delete(favorites::remove_favorite))
        .route(
            "/api/conversations",
            get(conversations::my_conversations).post(conversations::start_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(conversations::messages).post(conversations::send_message),
        )
        .route("/api/conversations/{id}/read", post(conversations::mark_read))
        .route(
            "/api/uploads/images",
            post(uploads::upload_images).layer(upload_limit),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            AuthMiddleware::require_auth,
        ));

    Router::new()
        .route("/ping", get(health::ping))
        .route("/api/health", get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/listings", get(listings::list_listings))
        .route("/api/listings/cities", get(listings::city_counts))
        .route("/api/listings/{id}", get(listings::get_listing))
        .route("/api/categories", get(categories::list_categories))
        .route("/api/locations", get(locations::list_locations))
        .route("/api/uploads/images/{filename}", get(uploads::serve_image))
        .merge(protected)
        .fallback(|| async { ApiError::NotFound("Route") })
        .with_state(state)
}

fn cors_layer(origins: &[String], token_header: HeaderName) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            token_header,
        ])
        .allow_credentials(true))
}

/// Builds the state from `config` and serves until the process is stopped.
pub async fn start(config: Config) -> Result<()> {
    let token_header = HeaderName::try_from(config.jwt.header.as_str())
        .context("Invalid token header name")?;
    let jwt = JwtService::new(&config.jwt, Arc::new(SystemClock))
        .context("Cannot start server without a usable JWT configuration")?;

    let store: Arc<dyn Store> = match &config.database {
        Some(db) => Arc::new(PgStore::new(db).await?),
        None => {
            tracing::warn!("⚠️  DATABASE_URL not set, using the in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    tracing::info!("🖼️  Images stored in {}", config.uploads.dir.display());
    let state = AppState::new(jwt, store, token_header.clone(), config.uploads.clone());
    let app = router(state).layer(
        ServiceBuilder::new().layer(cors_layer(&config.server.cors_origins, token_header)?),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr} - port may already be in use"))?;

    tracing::info!("🚀 DreamHome server starting...");
    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/ping", addr);
    tracing::info!("🔐 Tokens accepted from {} or Authorization: Bearer", config.jwt.header);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
