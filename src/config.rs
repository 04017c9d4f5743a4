//! Configuration module for environment variables and application settings

use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::path::PathBuf;

use crate::auth::extract::DEFAULT_TOKEN_HEADER;

const DEFAULT_JWT_EXPIRATION_MS: i64 = 86_400_000;
const DEFAULT_UPLOAD_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt: JwtConfig,

    /// `None` runs the server on the in-memory store
    pub database: Option<DatabaseConfig>,

    pub server: ServerConfig,

    pub uploads: UploadConfig,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Configured in milliseconds, carried in claims as whole seconds
    pub lifetime: chrono::Duration,
    /// Custom header checked before `Authorization`
    pub header: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .field("header", &self.header)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

/// Where uploaded listing images are written and how their URLs look
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    /// Prepended to the stored file name; ends with `/`
    pub url_prefix: String,
    pub max_file_bytes: usize,
}

impl UploadConfig {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str, max_file_bytes: usize) -> Self {
        let mut url_prefix = url_prefix.trim().to_string();
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }
        Self {
            dir: dir.into(),
            url_prefix,
            max_file_bytes,
        }
    }

    pub fn from_env() -> Result<Self> {
        let max_file_bytes = match env::var("UPLOAD_MAX_FILE_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("UPLOAD_MAX_FILE_BYTES is not a number: {raw}"))?,
            Err(_) => DEFAULT_UPLOAD_MAX_FILE_BYTES,
        };
        if max_file_bytes == 0 {
            bail!("UPLOAD_MAX_FILE_BYTES must be positive");
        }

        Ok(Self::new(
            env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            &env::var("UPLOAD_URL_PREFIX").unwrap_or_else(|_| "/api/uploads/images/".to_string()),
            max_file_bytes,
        ))
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            jwt: JwtConfig::from_env()?,

            database: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .map(|url| DatabaseConfig {
                    url,
                    max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(16),
                }),

            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                // $PORT wins when set by the hosting platform
                port: env::var("PORT")
                    .or_else(|_| env::var("SERVER_PORT"))
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(3000),
                cors_origins: env::var("CORS_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:5173".to_string())
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect(),
            },

            uploads: UploadConfig::from_env()?,
        })
    }
}

impl JwtConfig {
    pub fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow!("JWT_SECRET environment variable is required"))?;
        let lifetime_ms = match env::var("JWT_EXPIRATION_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("JWT_EXPIRATION_MS is not a number: {raw}"))?,
            Err(_) => DEFAULT_JWT_EXPIRATION_MS,
        };
        let header = env::var("JWT_HEADER").unwrap_or_else(|_| DEFAULT_TOKEN_HEADER.to_string());

        Self::new(secret, lifetime_ms, header)
    }

    pub fn new(secret: String, lifetime_ms: i64, header: String) -> Result<Self> {
        if secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if lifetime_ms < 1000 {
            bail!("JWT_EXPIRATION_MS must be at least 1000, got {lifetime_ms}");
        }
        axum::http::HeaderName::try_from(header.as_str())
            .with_context(|| format!("JWT_HEADER is not a valid header name: {header}"))?;

        Ok(Self {
            secret,
            lifetime: chrono::Duration::milliseconds(lifetime_ms),
            header,
        })
    }
}
