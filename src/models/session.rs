// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlete session model for storage and API.

use crate::time_utils::{rfc3339, rfc3339_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// An encrypted secret at rest: random nonce plus AEAD ciphertext (with tag).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Base64-encoded 96-bit nonce
    pub nonce: String,
    /// Base64-encoded ciphertext followed by the authentication tag
    pub ciphertext: String,
}

impl std::fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedSecret").finish_non_exhaustive()
    }
}

/// Session record stored in Firestore, one per athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Strava athlete ID (also used as document ID)
    pub athlete_id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    /// Encrypted access token
    pub access_token: EncryptedSecret,
    /// Encrypted refresh token
    pub refresh_token: EncryptedSecret,
    /// Access token expiry as reported by Strava (Unix timestamp)
    pub expires_at: i64,
    /// Last check-in or activity ping
    #[serde(with = "rfc3339")]
    pub last_activity: DateTime<Utc>,
    /// When the session was first created
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    /// `None` on records written before the field existed; treated as active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Set once, when the grant was revoked with Strava
    #[serde(default, with = "rfc3339_option")]
    pub deauthorized_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether the grant is still believed valid upstream.
    pub fn is_active(&self) -> bool {
        self.is_active.unwrap_or(true) && self.deauthorized_at.is_none()
    }

    /// Whether the sweep should process this session at `cutoff`.
    pub fn is_sweep_candidate(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_active() && self.last_activity < cutoff
    }

    /// Redacted view without any credential fields.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            athlete_id: self.athlete_id.clone(),
            firstname: self.firstname.clone(),
            lastname: self.lastname.clone(),
            expires_at: self.expires_at,
            last_activity: self.last_activity,
            created_at: self.created_at,
            is_active: self.is_active(),
            deauthorized_at: self.deauthorized_at,
        }
    }
}

/// Outward-facing session view. Token fields do not exist on this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionSummary {
    pub athlete_id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub expires_at: i64,
    #[serde(with = "rfc3339")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub last_activity: DateTime<Utc>,
    #[serde(with = "rfc3339")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default, with = "rfc3339_option")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub deauthorized_at: Option<DateTime<Utc>>,
}

/// Input to a session upsert, with tokens already encrypted.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub athlete_id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub access_token: EncryptedSecret,
    pub refresh_token: EncryptedSecret,
    pub expires_at: i64,
    pub now: DateTime<Utc>,
}

impl NewSession {
    /// Build the stored record, keeping `created_at` from an existing one.
    ///
    /// A re-login after deauthorization brings the session back to active.
    pub fn into_session(self, existing: Option<&Session>) -> Session {
        Session {
            created_at: existing.map(|s| s.created_at).unwrap_or(self.now),
            athlete_id: self.athlete_id,
            firstname: self.firstname,
            lastname: self.lastname,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            last_activity: self.now,
            is_active: Some(true),
            deauthorized_at: None,
        }
    }
}
