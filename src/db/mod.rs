// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: the session store contract and its backends.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{EncryptedSecret, NewSession, Session, SessionSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const SESSIONS: &str = "sessions";
}

/// Persistent mapping from athlete ID to session record.
///
/// Backends own uniqueness (one record per athlete) and must never expose
/// token fields through [`SessionStore::list_summaries`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite the session for `new.athlete_id`.
    async fn upsert(&self, new: NewSession) -> Result<Session, AppError>;

    async fn find(&self, athlete_id: &str) -> Result<Option<Session>, AppError>;

    /// Active sessions whose `last_activity` is older than `cutoff`.
    async fn find_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, AppError>;

    /// Redacted listing ordered by `last_activity`, most recent first.
    async fn list_summaries(&self) -> Result<Vec<SessionSummary>, AppError>;

    /// Write back a full record.
    async fn save(&self, session: &Session) -> Result<(), AppError>;

    /// Replace the stored credentials and expiry, leaving every other field
    /// alone. Returns `false` if there is no session for the athlete.
    async fn update_tokens(
        &self,
        athlete_id: &str,
        access_token: EncryptedSecret,
        refresh_token: EncryptedSecret,
        expires_at: i64,
    ) -> Result<bool, AppError>;

    /// Set `is_active = false` and `deauthorized_at = at` without touching
    /// any other field. Returns `false` if there is no session for the athlete.
    async fn mark_deauthorized(&self, athlete_id: &str, at: DateTime<Utc>)
        -> Result<bool, AppError>;

    /// Advance `last_activity`. Returns `false` (and writes nothing) if there
    /// is no session for the athlete.
    async fn touch(&self, athlete_id: &str, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, athlete_id: &str) -> Result<bool, AppError>;

    /// Absolute-age eviction. Returns the number of records removed.
    async fn delete_created_before(&self, ceiling: DateTime<Utc>) -> Result<usize, AppError>;
}
