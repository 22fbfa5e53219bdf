// SPDX-License-Identifier: MIT OR Apache-2.0
//! HS256 bearer tokens.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a plantr bearer token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,
    /// The authenticated node.
    pub node_id: String,
}

/// Errors from token handling.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Signing failed.
    #[error("error signing JWT: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    /// The token failed signature or claim validation.
    #[error("error parsing JWT: {0}")]
    Parse(#[source] jsonwebtoken::errors::Error),

    /// The token is not even structurally a JWT.
    #[error("malformed JWT")]
    Malformed,
}

/// Mint a token for `node_id` expiring at `expires_at`.
pub fn mint(
    signing_key: &[u8],
    node_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    let claims = Claims {
        exp: expires_at.timestamp(),
        node_id: node_id.to_string(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .map_err(TokenError::Sign)
}

/// Verify a token's signature and expiry, returning its claims.
pub fn verify(token: &str, signing_key: &[u8]) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_key),
        &validation,
    )
    .map_err(TokenError::Parse)?;
    Ok(data.claims)
}

/// Read a token's `exp` claim without verifying its signature.
///
/// Used by the agent on tokens it received from the controller itself, so
/// the missing signature check only affects the agent's own refresh timing.
pub fn peek_expiration(token: &str) -> Result<DateTime<Utc>, TokenError> {
    #[derive(Deserialize)]
    struct ExpOnly {
        exp: i64,
    }

    let payload = token.split('.').nth(1).ok_or(TokenError::Malformed)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    let claims: ExpOnly = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    Utc.timestamp_opt(claims.exp, 0)
        .single()
        .ok_or(TokenError::Malformed)
}
