// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment and read
//! once at startup. Anything missing here is a fatal startup error.

use std::env;
use std::time::Duration;

/// Minimum length of the token encryption secret, in bytes.
pub const MIN_ENCRYPTION_KEY_LEN: usize = 32;

/// Which session store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Session store backend
    pub store_backend: StoreBackend,
    /// Server port
    pub port: u16,

    // --- Lifecycle policy ---
    /// How often the inactivity sweep runs
    pub sweep_interval: Duration,
    /// Sessions idle for longer than this are refreshed and deauthorized
    pub inactivity_threshold: chrono::Duration,
    /// Sessions created longer ago than this are evicted regardless of activity
    pub max_session_age: chrono::Duration,
    /// Timeout applied to every upstream Strava call
    pub upstream_timeout: Duration,
    /// Number of sweep candidates processed concurrently
    pub sweep_concurrency: usize,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Secret from which the token encryption key is derived
    pub token_encryption_key: Vec<u8>,
    /// API key for privileged (admin) callers
    pub admin_api_key: String,
    /// JWT signing key for athlete session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    pub const DEFAULT_SWEEP_INTERVAL_HOURS: u64 = 24;
    pub const DEFAULT_INACTIVITY_DAYS: i64 = 30;
    pub const DEFAULT_MAX_SESSION_AGE_DAYS: i64 = 180;
    pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_SWEEP_CONCURRENCY: usize = 4;

    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            allowed_origins: vec!["http://localhost:4200".to_string()],
            gcp_project_id: "test-project".to_string(),
            store_backend: StoreBackend::Memory,
            port: 8080,
            sweep_interval: Duration::from_secs(Self::DEFAULT_SWEEP_INTERVAL_HOURS * 3600),
            inactivity_threshold: chrono::Duration::days(Self::DEFAULT_INACTIVITY_DAYS),
            max_session_age: chrono::Duration::days(Self::DEFAULT_MAX_SESSION_AGE_DAYS),
            upstream_timeout: Duration::from_secs(Self::DEFAULT_UPSTREAM_TIMEOUT_SECS),
            sweep_concurrency: Self::DEFAULT_SWEEP_CONCURRENCY,
            strava_client_secret: "test_secret".to_string(),
            token_encryption_key: b"test_encryption_key_32_bytes_min!".to_vec(),
            admin_api_key: "test_admin_key".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// For local development, a `.env` file is honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let token_encryption_key = required("TOKEN_ENCRYPTION_KEY")?.into_bytes();
        if token_encryption_key.len() < MIN_ENCRYPTION_KEY_LEN {
            return Err(ConfigError::Invalid {
                name: "TOKEN_ENCRYPTION_KEY",
                reason: format!("must be at least {} bytes", MIN_ENCRYPTION_KEY_LEN),
            });
        }

        let store_backend = match env::var("SESSION_STORE").as_deref() {
            Err(_) | Ok("firestore") => StoreBackend::Firestore,
            Ok("memory") => StoreBackend::Memory,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "SESSION_STORE",
                    reason: format!("unknown backend '{}'", other),
                })
            }
        };

        let sweep_concurrency: usize =
            parse_or("SWEEP_CONCURRENCY", Self::DEFAULT_SWEEP_CONCURRENCY)?;
        if sweep_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:4200".to_string())
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            store_backend,
            port: parse_or("PORT", 8080)?,
            sweep_interval: parse_hours(
                "SWEEP_INTERVAL_HOURS",
                Self::DEFAULT_SWEEP_INTERVAL_HOURS,
            )?,
            inactivity_threshold: parse_days("INACTIVITY_DAYS", Self::DEFAULT_INACTIVITY_DAYS)?,
            max_session_age: parse_days(
                "MAX_SESSION_AGE_DAYS",
                Self::DEFAULT_MAX_SESSION_AGE_DAYS,
            )?,
            upstream_timeout: Duration::from_secs(parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                Self::DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?),
            sweep_concurrency,
            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            token_encryption_key,
            admin_api_key: required("ADMIN_API_KEY")?,
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
        })
    }
}

/// Read a required variable, trimming stray whitespace from secret bindings.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("could not parse '{}'", raw),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_hours(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let hours: u64 = parse_or(name, default)?;
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            name,
            reason: format!("{} hours is out of range", hours),
        })
}

/// A positive number of days.
fn parse_days(name: &'static str, default: i64) -> Result<chrono::Duration, ConfigError> {
    let days: i64 = parse_or(name, default)?;
    if days <= 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be at least 1 day".to_string(),
        });
    }
    chrono::TimeDelta::try_days(days).ok_or_else(|| ConfigError::Invalid {
        name,
        reason: format!("{} days is out of range", days),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test touching the process environment to avoid races between tests.
    #[test]
    fn test_config_from_env() {
        env::set_var("STRAVA_CLIENT_ID", "test_id");
        env::set_var("STRAVA_CLIENT_SECRET", " test_secret\n");
        env::set_var("ADMIN_API_KEY", "admin");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("ALLOWED_ORIGINS", "http://localhost:4200, https://example.github.io");
        env::set_var("SESSION_STORE", "memory");

        env::set_var("TOKEN_ENCRYPTION_KEY", "too-short");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "TOKEN_ENCRYPTION_KEY",
                ..
            })
        ));

        env::set_var(
            "TOKEN_ENCRYPTION_KEY",
            "0123456789abcdef0123456789abcdef",
        );
        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.strava_client_id, "test_id");
        assert_eq!(config.strava_client_secret, "test_secret");
        assert_eq!(config.port, 8080);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:4200", "https://example.github.io"]
        );
        assert_eq!(config.inactivity_threshold, chrono::Duration::days(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(24 * 3600));

        env::set_var("SWEEP_INTERVAL_HOURS", u64::MAX.to_string());
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "SWEEP_INTERVAL_HOURS",
                ..
            })
        ));
        env::remove_var("SWEEP_INTERVAL_HOURS");

        env::set_var("INACTIVITY_DAYS", i64::MAX.to_string());
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "INACTIVITY_DAYS",
                ..
            })
        ));
        env::set_var("INACTIVITY_DAYS", "0");
        assert!(Config::from_env().is_err());
        env::remove_var("INACTIVITY_DAYS");

        env::set_var("MAX_SESSION_AGE_DAYS", "-5");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "MAX_SESSION_AGE_DAYS",
                ..
            })
        ));
        env::remove_var("MAX_SESSION_AGE_DAYS");

        env::set_var("SWEEP_CONCURRENCY", "0");
        assert!(Config::from_env().is_err());
        env::remove_var("SWEEP_CONCURRENCY");

        env::remove_var("ADMIN_API_KEY");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("ADMIN_API_KEY"))
        ));
    }
}
