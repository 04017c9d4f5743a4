//! # DreamHome Server
//!
//! REST backend for a real-estate marketplace: listings, categories,
//! locations, users, favorites and buyer/seller messaging, secured with
//! stateless JWT bearer tokens.
//!
//! ## Architecture
//! - `server`: router assembly and startup
//! - `config`: environment configuration
//! - `auth`: token service, auth middleware, authorization policy
//! - `database`: the `Store` trait with PostgreSQL and in-memory backends
//! - `routes`: HTTP handlers grouped by resource
//!
//! ## Environment Setup
//! `JWT_SECRET` is required. Without `DATABASE_URL` the server runs on the
//! in-memory store. See `config.rs` for the full list.
//!
//! ## Running the Server
//! ```bash
//! JWT_SECRET=change-me cargo run
//! curl http://localhost:3000/ping
//! ```

mod auth;
mod config;
mod database;
mod error;
mod routes;
mod server;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();

    tracing::info!("🏁 Starting DreamHome server...");
    tracing::info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!("🏗️  Build profile: {}", if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    });

    let config = config::Config::from_env()?;
    server::start(config).await
}
