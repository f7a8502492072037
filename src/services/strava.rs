// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth client for token refresh and grant revocation.
//!
//! Each call is a single round-trip with a bounded timeout. Nothing here
//! retries; the sweep simply picks the session up again next time.

use crate::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
const STRAVA_DEAUTHORIZE_URL: &str = "https://www.strava.com/oauth/deauthorize";

/// Fresh credentials returned by a refresh.
#[derive(Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp
    pub expires_at: i64,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The upstream OAuth operations the session lifecycle depends on.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AppError>;

    /// Revoke the grant the access token belongs to.
    async fn revoke(&self, access_token: &str) -> Result<(), AppError>;
}

/// Strava OAuth client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    token_url: String,
    deauthorize_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Self::with_endpoints(
            client_id,
            client_secret,
            timeout,
            STRAVA_TOKEN_URL.to_string(),
            STRAVA_DEAUTHORIZE_URL.to_string(),
        )
    }

    /// Create a client against non-default endpoints (e.g. a local mock).
    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        timeout: Duration,
        token_url: String,
        deauthorize_url: String,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token_url,
            deauthorize_url,
            client_id,
            client_secret,
        })
    }
}

/// Turn a non-success response into `(status, short message)`.
///
/// Only the status line and Strava's error `message` are kept; the body is
/// never logged in full.
async fn failure_details(response: reqwest::Response) -> (u16, String) {
    #[derive(Deserialize)]
    struct StravaFault {
        message: Option<String>,
    }

    let status = response.status();
    let message = response
        .json::<StravaFault>()
        .await
        .ok()
        .and_then(|f| f.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

    (status.as_u16(), message)
}

fn transport_message(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else {
        format!("request failed: {}", e.without_url())
    }
}

#[async_trait]
impl OAuthProvider for StravaClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Refresh {
                status: None,
                message: transport_message(e),
            })?;

        if response.status() != reqwest::StatusCode::OK {
            let (status, message) = failure_details(response).await;
            if status == 429 {
                tracing::warn!("Strava rate limit hit (429) on token refresh");
            }
            return Err(AppError::Refresh {
                status: Some(status),
                message,
            });
        }

        response.json().await.map_err(|e| AppError::Refresh {
            status: Some(200),
            message: format!("JSON parse error: {}", e.without_url()),
        })
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(&self.deauthorize_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Revoke {
                status: None,
                message: transport_message(e),
            })?;

        if response.status() != reqwest::StatusCode::OK {
            let (status, message) = failure_details(response).await;
            return Err(AppError::Revoke {
                status: Some(status),
                message,
            });
        }

        tracing::debug!("Strava deauthorization successful");
        Ok(())
    }
}
