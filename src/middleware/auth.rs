// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Caller authentication.
//!
//! Two kinds of caller exist: admins presenting the shared `x-api-key`, and
//! athletes presenting the session JWT issued when their session was created
//! (as a Bearer token or the `strava_session` cookie).

use crate::error::AppError;
use crate::services::Requester;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Cookie carrying the athlete session JWT.
pub const SESSION_COOKIE: &str = "strava_session";

/// Session JWT lifetime (30 days).
pub const SESSION_TOKEN_TTL_SECS: usize = 30 * 24 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (Strava athlete ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Whether the request carries the correct admin API key.
fn has_admin_key(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|presented| bool::from(presented.as_bytes().ct_eq(expected.as_bytes())))
        .unwrap_or(false)
}

/// Session JWT from the cookie or the Authorization header.
fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Middleware that only lets admin callers through.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !has_admin_key(request.headers(), &state.config.admin_api_key) {
        tracing::warn!(path = %request.uri().path(), "Rejected request without valid API key");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Middleware that resolves the caller to a [`Requester`] and stores it in
/// the request extensions. Rejects anonymous callers.
pub async fn require_requester(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let requester = if has_admin_key(request.headers(), &state.config.admin_api_key) {
        Requester::Admin
    } else {
        let token = session_token(&jar, request.headers()).ok_or(AppError::Unauthorized)?;
        let athlete_id = verify_session_token(&token, &state.config.jwt_signing_key)
            .ok_or(AppError::Unauthorized)?;
        Requester::Athlete(athlete_id)
    };

    request.extensions_mut().insert(requester);
    Ok(next.run(request).await)
}

/// Create a session JWT identifying an athlete.
pub fn create_session_token(athlete_id: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: athlete_id.to_string(),
        iat: now,
        exp: now + SESSION_TOKEN_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// Verify a session JWT and return the athlete ID it was issued for.
pub fn verify_session_token(token: &str, signing_key: &[u8]) -> Option<String> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims.sub)
        .filter(|sub| !sub.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const KEY: &[u8] = b"test_jwt_key_32_bytes_minimum!!";

    #[test]
    fn test_session_token_round_trip() {
        let token = create_session_token("12345", KEY).unwrap();
        assert_eq!(verify_session_token(&token, KEY).as_deref(), Some("12345"));
    }

    #[test]
    fn test_session_token_rejects_wrong_key() {
        let token = create_session_token("12345", KEY).unwrap();
        assert!(verify_session_token(&token, b"another_key_another_key_another").is_none());
        assert!(verify_session_token("not.a.jwt", KEY).is_none());
    }

    #[test]
    fn test_expired_session_token_rejected() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let claims = Claims {
            sub: "12345".to_string(),
            iat: 1_000_000,
            exp: 1_000_060,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(KEY),
        )
        .unwrap();
        assert!(verify_session_token(&token, KEY).is_none());
    }

    #[test]
    fn test_admin_key_check() {
        let mut headers = HeaderMap::new();
        assert!(!has_admin_key(&headers, "secret"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert!(!has_admin_key(&headers, "secret"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        assert!(has_admin_key(&headers, "secret"));
    }

    #[test]
    fn test_session_token_prefers_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            session_token(&CookieJar::new(), &headers).as_deref(),
            Some("from-header")
        );

        headers.insert(header::COOKIE, HeaderValue::from_static("strava_session=from-cookie"));
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(session_token(&jar, &headers).as_deref(), Some("from-cookie"));
    }
}
