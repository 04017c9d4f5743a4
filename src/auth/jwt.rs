//! JWT Token Service
//!
//! Issues HS256-signed bearer tokens for users and verifies them back into
//! claims. Expiry is checked against an injected [`Clock`] rather than the
//! library's own view of the system time, with zero leeway.

use anyhow::{Result, bail};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::clock::Clock;
use crate::auth::models::Role;
use crate::config::JwtConfig;
use crate::database::models::User;

/// JWT Claims structure containing user information and token metadata
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User unique identifier
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiration, seconds since the epoch
    pub exp: i64,
}

/// Why a token was not accepted
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("failed to encode token")]
    Encoding,
}

/// Freshly signed token plus its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// JWT Service for token operations
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl JwtService {
    /// Create a new JWT service. An empty secret or a lifetime shorter than
    /// one second is a configuration error.
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.secret.trim().is_empty() {
            bail!("JWT secret must not be empty");
        }
        if config.lifetime < chrono::Duration::seconds(1) {
            bail!("JWT lifetime must be at least one second");
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            lifetime: config.lifetime,
            clock,
        })
    }

    /// Sign a token for `user`
    pub fn issue(&self, user: &User) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| {
                tracing::error!("Failed to encode JWT: {}", e);
                TokenError::Encoding
            })?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Check signature and expiry, returning the embedded claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            },
        )?;

        if self.clock.now().timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::{TimeZone, Utc};

    fn sample_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "anna@example.com".to_string(),
            password_hash: "not-a-real-hash".to_string(),
            role,
            first_name: Some("Anna".to_string()),
            last_name: None,
            phone: None,
            avatar_url: None,
            agency_name: None,
            created_at: Utc::now(),
        }
    }

    fn service_with(lifetime: chrono::Duration) -> (JwtService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let config = JwtConfig {
            secret: "test_secret".to_string(),
            lifetime,
            header: "X-JWT-Token".to_string(),
        };
        let service = JwtService::new(&config, clock.clone()).unwrap();
        (service, clock)
    }

    #[test]
    fn test_jwt_roundtrip() {
        let (service, _) = service_with(chrono::Duration::hours(24));
        for role in [Role::User, Role::Agent, Role::Admin] {
            let user = sample_user(role);
            let issued = service.issue(&user).unwrap();
            let claims = service.verify(&issued.token).unwrap();

            assert_eq!(claims.sub, user.id);
            assert_eq!(claims.email, user.email);
            assert_eq!(claims.role, role);
            assert!(claims.exp > claims.iat);
            assert_eq!(claims.exp, issued.expires_at);
        }
    }

    #[test]
    fn test_valid_until_just_before_expiry() {
        let (service, clock) = service_with(chrono::Duration::seconds(60));
        let issued = service.issue(&sample_user(Role::User)).unwrap();

        clock.advance(chrono::Duration::seconds(59));
        assert!(service.verify(&issued.token).is_ok());

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(service.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_one_second_token_expires_after_two_seconds() {
        let (service, clock) = service_with(chrono::Duration::seconds(1));
        let issued = service.issue(&sample_user(Role::Agent)).unwrap();

        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(service.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_any_signature_byte_flip_is_rejected() {
        let (service, _) = service_with(chrono::Duration::hours(1));
        let issued = service.issue(&sample_user(Role::User)).unwrap();

        let (signing_input, signature) = issued.token.rsplit_once('.').unwrap();
        let signature = URL_SAFE_NO_PAD.decode(signature).unwrap();

        for index in 0..signature.len() {
            let mut tampered = signature.clone();
            tampered[index] ^= 0x01;
            let forged = format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(&tampered));
            assert_eq!(
                service.verify(&forged),
                Err(TokenError::InvalidSignature),
                "flipped byte {index} was accepted"
            );
        }
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let (service, clock) = service_with(chrono::Duration::hours(1));
        let other = JwtService::new(
            &JwtConfig {
                secret: "another_secret".to_string(),
                lifetime: chrono::Duration::hours(1),
                header: "X-JWT-Token".to_string(),
            },
            clock,
        )
        .unwrap();
        let issued = other.issue(&sample_user(Role::Admin)).unwrap();

        assert_eq!(service.verify(&issued.token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (service, _) = service_with(chrono::Duration::hours(1));
        for input in ["", "abc", "a.b.c", "....", "Bearer"] {
            assert_eq!(service.verify(input), Err(TokenError::Malformed), "{input:?}");
        }
    }

    #[test]
    fn test_unknown_role_claim_is_malformed() {
        let (service, _) = service_with(chrono::Duration::hours(1));
        let now = Utc::now().timestamp();
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({
                "sub": Uuid::new_v4(),
                "email": "x@example.com",
                "role": "ROOT",
                "iat": now,
                "exp": now + 3600,
            }),
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        assert_eq!(service.verify(&forged), Err(TokenError::Malformed));
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let clock: Arc<dyn Clock> = Arc::new(crate::auth::clock::SystemClock);
        let empty = JwtConfig {
            secret: "  ".to_string(),
            lifetime: chrono::Duration::hours(1),
            header: "X-JWT-Token".to_string(),
        };
        assert!(JwtService::new(&empty, clock.clone()).is_err());

        let too_short = JwtConfig {
            secret: "secret".to_string(),
            lifetime: chrono::Duration::milliseconds(500),
            header: "X-JWT-Token".to_string(),
        };
        assert!(JwtService::new(&too_short, clock).is_err());
    }
}
