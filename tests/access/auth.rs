//! JWT and token transport tests.
//!
//! Verifies token signing, algorithm handling, secret strength, and which
//! request source a token is read from.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use warden::auth::{self, TokenSource};
use warden::config::Auth as AuthConfig;

fn auth_config(secret: &str) -> AuthConfig {
    AuthConfig {
        jwt_secret: secret.to_string(),
        ..Default::default()
    }
}

/// The JWT layer rejects secrets shorter than 32 bytes.
#[test]
fn rejects_short_secret() {
    let config = auth_config("x");
    assert!(
        auth::create_token(&config, "user-1").is_err(),
        "Short secret should be rejected"
    );
}

#[test]
fn rejects_empty_secret() {
    let config = auth_config("");
    assert!(auth::create_token(&config, "admin").is_err());
    assert!(auth::verify_token(&config, "a.b.c").is_err());
}

/// `Validation::default()` restricts to HS256, so a token forged with
/// `"alg":"none"` must be rejected.
#[test]
fn rejects_none_algorithm_token() {
    use base64::Engine;
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let payload = engine.encode(
        serde_json::json!({"sub":"admin","exp":9999999999i64,"iat":1700000000}).to_string(),
    );
    let forged = format!("{header}.{payload}.");

    let config = auth_config("real_secret_that_is_at_least_32b!");
    assert!(auth::verify_token(&config, &forged).is_err());
    assert!(auth::verify(&config, &forged, true).is_err());
}

/// Rotating the signing key invalidates all outstanding tokens.
#[test]
fn key_rotation_invalidates_old_tokens() {
    let old = auth_config("old_secret_key_production_32byte!");
    let new = auth_config("new_secret_key_production_32byte!");
    let token = auth::create_token(&old, "user-1").unwrap();
    assert!(auth::verify_token(&new, &token).is_err());
}

/// RFC 7235: the auth-scheme is case-insensitive.
#[test]
fn bearer_scheme_is_case_insensitive() {
    let config = auth_config("test_secret_that_is_at_least_32b!");
    let token = auth::create_token(&config, "user-1").unwrap();

    let mut headers = hyper::http::HeaderMap::new();
    headers.insert("Authorization", format!("bearer {token}").parse().unwrap());

    let extracted = auth::extract_token(&headers, &config, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert_eq!(extracted.as_deref(), Some(token.as_str()));
}

#[test]
fn ipv6_loopback_is_a_service_host() {
    let config = auth_config("test_secret_that_is_at_least_32b!");
    assert_eq!(
        auth::token_source(&config, Some(IpAddr::V6(Ipv6Addr::LOCALHOST))),
        TokenSource::Header
    );
}

#[test]
fn custom_cookie_name_is_honored() {
    let mut config = auth_config("test_secret_that_is_at_least_32b!");
    config.cookie_name = "session".to_string();

    let mut headers = hyper::http::HeaderMap::new();
    headers.insert("Cookie", "auth_token=wrong; session=right".parse().unwrap());

    assert_eq!(auth::extract_token(&headers, &config, None).as_deref(), Some("right"));
}

#[test]
fn unparseable_service_hosts_never_match() {
    let mut config = auth_config("test_secret_that_is_at_least_32b!");
    config.service_hosts = vec!["localhost".to_string()];
    assert_eq!(
        auth::token_source(&config, Some(IpAddr::V4(Ipv4Addr::LOCALHOST))),
        TokenSource::Cookie
    );
}
