// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory session store for tests and local development.

use crate::db::SessionStore;
use crate::error::AppError;
use crate::models::{EncryptedSecret, NewSession, Session, SessionSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Session store backed by a concurrent hash map. Cheap to clone; clones
/// share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<DashMap<String, Session>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write operations performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Insert a record as-is, bypassing upsert semantics (test seeding).
    pub fn insert_raw(&self, session: Session) {
        self.sessions.insert(session.athlete_id.clone(), session);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert(&self, new: NewSession) -> Result<Session, AppError> {
        self.record_write();
        let session = match self.sessions.entry(new.athlete_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let session = new.into_session(Some(occupied.get()));
                occupied.insert(session.clone());
                session
            }
            Entry::Vacant(vacant) => {
                let session = new.into_session(None);
                vacant.insert(session.clone());
                session
            }
        };
        Ok(session)
    }

    async fn find(&self, athlete_id: &str) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.get(athlete_id).map(|s| s.clone()))
    }

    async fn find_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.is_sweep_candidate(cutoff))
            .map(|s| s.clone())
            .collect())
    }

    async fn list_summaries(&self) -> Result<Vec<SessionSummary>, AppError> {
        let mut summaries: Vec<SessionSummary> =
            self.sessions.iter().map(|s| s.summary()).collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }

    async fn save(&self, session: &Session) -> Result<(), AppError> {
        self.record_write();
        self.sessions
            .insert(session.athlete_id.clone(), session.clone());
        Ok(())
    }

    async fn update_tokens(
        &self,
        athlete_id: &str,
        access_token: EncryptedSecret,
        refresh_token: EncryptedSecret,
        expires_at: i64,
    ) -> Result<bool, AppError> {
        match self.sessions.get_mut(athlete_id) {
            Some(mut session) => {
                self.record_write();
                session.access_token = access_token;
                session.refresh_token = refresh_token;
                session.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_deauthorized(
        &self,
        athlete_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self.sessions.get_mut(athlete_id) {
            Some(mut session) => {
                self.record_write();
                session.is_active = Some(false);
                session.deauthorized_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch(&self, athlete_id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        match self.sessions.get_mut(athlete_id) {
            Some(mut session) => {
                self.record_write();
                if at > session.last_activity {
                    session.last_activity = at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, athlete_id: &str) -> Result<bool, AppError> {
        let removed = self.sessions.remove(athlete_id).is_some();
        if removed {
            self.record_write();
        }
        Ok(removed)
    }

    async fn delete_created_before(&self, ceiling: DateTime<Utc>) -> Result<usize, AppError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.created_at >= ceiling);
        let removed = before - self.sessions.len();
        if removed > 0 {
            self.record_write();
        }
        Ok(removed)
    }
}
