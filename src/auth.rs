//! Connection token verification and issuance
//!
//! Tokens are HS256 JWTs carrying the username. Verification happens once,
//! at connect time; an open connection is never re-validated.

use std::time::Duration;

use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AuthFailure};
use crate::types::Identity;

/// Claims carried by a connection token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiry (Unix timestamp)
    pub exp: u64,
}

/// Validates and signs connection tokens with a shared secret
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Create a verifier for the given secret and token lifetime
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Verify a token presented at connect time
    ///
    /// A missing or empty token is `Missing`; anything that fails signature,
    /// expiry or username checks is `Invalid`.
    pub fn verify(&self, token: Option<&str>) -> Result<Identity, AuthFailure> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthFailure::Missing),
        };

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            AuthFailure::Invalid
        })?;

        Identity::parse(data.claims.username).ok_or(AuthFailure::Invalid)
    }

    /// Sign a token for the given identity using the configured lifetime
    pub fn issue(&self, identity: &Identity) -> Result<String, AppError> {
        let now = get_current_timestamp();
        let claims = Claims {
            username: identity.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }
}
