//! Bearer token extraction
//!
//! Tokens may arrive in a custom header (deployments where `Authorization`
//! is taken by an upstream Basic Auth layer) or as a standard bearer token.
//! Sources are tried in order and the first hit wins.

use axum::http::{HeaderMap, HeaderName, header};

pub const DEFAULT_TOKEN_HEADER: &str = "x-jwt-token";

/// One place a token can be read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Raw token in a dedicated header
    CustomHeader(HeaderName),
    /// `Authorization: Bearer <token>`
    Bearer,
}

impl TokenSource {
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        match self {
            TokenSource::CustomHeader(name) => headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            TokenSource::Bearer => headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        }
    }
}

/// Default order: custom header first, then the bearer header
pub fn default_sources(custom_header: HeaderName) -> Vec<TokenSource> {
    vec![TokenSource::CustomHeader(custom_header), TokenSource::Bearer]
}

pub fn extract_token(sources: &[TokenSource], headers: &HeaderMap) -> Option<String> {
    sources.iter().find_map(|source| source.extract(headers))
}
