//! JWT authentication utilities.
//!
//! Tokens reach the server one of two ways. Service-to-service calls from a
//! host in `auth.service_hosts` send `Authorization: Bearer <token>`; browser
//! calls send the HTTP-only token cookie. Exactly one source is consulted per
//! request, chosen by the caller's address.

use std::net::IpAddr;

use hyper::http::HeaderMap;
use hyper::http::header::{AUTHORIZATION, COOKIE};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::{Auth as AuthConfig, Config};
use crate::error::{Error, Result};

const MIN_SECRET_LENGTH: usize = 32;

fn validate_secret(config: &AuthConfig) -> Result<()> {
    if config.jwt_secret.len() < MIN_SECRET_LENGTH {
        return Err(Error::Config(format!(
            "JWT secret must be at least {MIN_SECRET_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Create a JWT token for a user.
pub fn create_token(config: &AuthConfig, user_id: &str) -> Result<String> {
    validate_secret(config)?;
    let now = jiff::Timestamp::now();
    let hours = config.token_expiry_days as i64 * 24;
    let exp = now + jiff::Span::new().hours(hours);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.as_second(),
        iat: now.as_second(),
    };

    sign(config, &claims)
}

fn sign(config: &AuthConfig, claims: &Claims) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Token creation failed: {e}")))
}

/// Verify and decode a JWT token.
///
/// # Returns
/// - `Ok(Claims)` if the token is valid
/// - `Err(Error::TokenExpired)` if the token has expired
/// - `Err(Error::Unauthorized)` for any other validation failure
pub fn verify_token(config: &AuthConfig, token: &str) -> Result<Claims> {
    verify(config, token, false)
}

/// Verify a token, optionally ignoring its expiry.
pub fn verify(config: &AuthConfig, token: &str, allow_expired: bool) -> Result<Claims> {
    validate_secret(config)?;
    let mut validation = Validation::default();
    if allow_expired {
        validation.validate_exp = false;
    }
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => Error::TokenExpired,
        _ => Error::Unauthorized,
    })?;

    Ok(token_data.claims)
}

/// Where a request's token is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer` header.
    Header,
    /// HTTP-only cookie.
    Cookie,
}

/// Choose the token source for a caller.
pub fn token_source(config: &AuthConfig, peer: Option<IpAddr>) -> TokenSource {
    let trusted = peer.is_some_and(|ip| {
        config
            .service_hosts
            .iter()
            .any(|host| host.parse::<IpAddr>().is_ok_and(|h| h == ip))
    });
    if trusted {
        TokenSource::Header
    } else {
        TokenSource::Cookie
    }
}

/// Bearer token from the Authorization header (scheme is case-insensitive).
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .get(..7)
        .filter(|p| p.eq_ignore_ascii_case("bearer "))
        .map(|_| value[7..].trim())
        .filter(|t| !t.is_empty())
}

/// Value of cookie `name` from the Cookie header.
pub fn cookie_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}

/// Extract the token from the source selected for `peer`.
pub fn extract_token(
    headers: &HeaderMap,
    config: &AuthConfig,
    peer: Option<IpAddr>,
) -> Option<String> {
    match token_source(config, peer) {
        TokenSource::Header => bearer_token(headers).map(str::to_string),
        TokenSource::Cookie => cookie_token(headers, &config.cookie_name),
    }
}

/// Authenticate a request and return the caller's user id.
///
/// Outside production, expired tokens are accepted.
pub fn authenticate(headers: &HeaderMap, config: &Config, peer: Option<IpAddr>) -> Result<String> {
    let token = extract_token(headers, &config.auth, peer).ok_or(Error::Unauthorized)?;
    let claims = verify(&config.auth, &token, !config.server.production)?;
    Ok(claims.sub)
}
