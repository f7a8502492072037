// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle management.
//!
//! Foreground operations (create, touch, list, delete) plus the periodic
//! inactivity sweep. For each stale session the sweep runs:
//!
//! 1. Re-read the record (skip it if it was touched or deactivated meanwhile)
//! 2. Decrypt the refresh token
//! 3. Refresh with Strava and persist the new tokens immediately
//! 4. Deauthorize with the fresh access token
//! 5. Mark the session inactive
//!
//! The sweep only writes credential and active-state fields, never
//! `last_activity`.
//!
//! Strava only accepts a deauthorization carrying a live access token, which
//! is why the refresh comes first. A failure at any step leaves the session
//! active; it is simply a candidate again on the next sweep.

use crate::config::Config;
use crate::db::SessionStore;
use crate::error::AppError;
use crate::models::{NewSession, Session, SessionSummary};
use crate::services::cipher::CredentialCipher;
use crate::services::strava::OAuthProvider;
use crate::time_utils::now_millis;
use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;

/// Margin before access token expiry when deletion refreshes first (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Identity of the caller of a foreground operation, as resolved by the
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    Admin,
    Athlete(String),
}

impl Requester {
    /// Admins may manage any session; athletes only their own.
    pub fn may_manage(&self, athlete_id: &str) -> bool {
        match self {
            Requester::Admin => true,
            Requester::Athlete(id) => id == athlete_id,
        }
    }
}

/// Session creation input, with plaintext tokens straight from the OAuth flow.
#[derive(Clone)]
pub struct CreateSession {
    pub athlete_id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Timing and parallelism knobs for the lifecycle.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub inactivity_threshold: Duration,
    pub max_session_age: Duration,
    pub sweep_concurrency: usize,
}

impl LifecyclePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inactivity_threshold: config.inactivity_threshold,
            max_session_age: config.max_session_age,
            sweep_concurrency: config.sweep_concurrency.max(1),
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::days(Config::DEFAULT_INACTIVITY_DAYS),
            max_session_age: Duration::days(Config::DEFAULT_MAX_SESSION_AGE_DAYS),
            sweep_concurrency: Config::DEFAULT_SWEEP_CONCURRENCY,
        }
    }
}

/// Sweep step at which a candidate failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStep {
    Reload,
    Decrypt,
    Refresh,
    PersistRefresh,
    Revoke,
    PersistDeauthorization,
}

impl SweepStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepStep::Reload => "reload",
            SweepStep::Decrypt => "decrypt",
            SweepStep::Refresh => "refresh",
            SweepStep::PersistRefresh => "persist_refresh",
            SweepStep::Revoke => "revoke",
            SweepStep::PersistDeauthorization => "persist_deauthorization",
        }
    }
}

impl std::fmt::Display for SweepStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-candidate result of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Deauthorized,
    /// Touched, deactivated or deleted since it was selected
    Skipped,
    Failed(SweepStep),
}

/// Summary of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub deauthorized: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::Deauthorized => self.deauthorized += 1,
            CandidateOutcome::Skipped => self.skipped += 1,
            CandidateOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Owns the session lifecycle: encrypted storage, activity tracking and
/// inactivity-driven deauthorization.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn OAuthProvider>,
    cipher: CredentialCipher,
    policy: LifecyclePolicy,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn OAuthProvider>,
        cipher: CredentialCipher,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            store,
            provider,
            cipher,
            policy,
        }
    }

    // ─── Foreground Operations ───────────────────────────────────

    /// Create or overwrite the session for an athlete.
    pub async fn create_or_update(&self, input: CreateSession) -> Result<SessionSummary, AppError> {
        let athlete_id = input.athlete_id.trim().to_string();
        if athlete_id.is_empty() {
            return Err(AppError::Validation("athleteId is required".to_string()));
        }
        if input.access_token.is_empty() || input.refresh_token.is_empty() {
            return Err(AppError::Validation(
                "accessToken and refreshToken are required".to_string(),
            ));
        }

        let (access_token, refresh_token) = self
            .cipher
            .encrypt_tokens(&input.access_token, &input.refresh_token)?;

        let session = self
            .store
            .upsert(NewSession {
                athlete_id,
                firstname: input.firstname,
                lastname: input.lastname,
                access_token,
                refresh_token,
                expires_at: input.expires_at,
                now: now_millis(),
            })
            .await?;

        tracing::info!(athlete_id = %session.athlete_id, "Session created or updated");
        Ok(session.summary())
    }

    /// Record activity for an athlete, resetting the inactivity clock.
    pub async fn touch(&self, athlete_id: &str) -> Result<(), AppError> {
        if self.store.touch(athlete_id, now_millis()).await? {
            tracing::debug!(athlete_id, "Session activity recorded");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Session for athlete {}", athlete_id)))
        }
    }

    /// All sessions, most recently active first, without credentials.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, AppError> {
        self.store.list_summaries().await
    }

    /// Delete a session, revoking the grant with Strava first (best-effort).
    pub async fn delete(&self, athlete_id: &str, requester: &Requester) -> Result<(), AppError> {
        if !requester.may_manage(athlete_id) {
            tracing::warn!(athlete_id, requester = ?requester, "Rejected session deletion");
            return Err(AppError::Forbidden);
        }

        let session = self
            .store
            .find(athlete_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session for athlete {}", athlete_id)))?;

        if session.is_active() {
            self.revoke_best_effort(&session).await?;
        }

        if !self.store.delete(athlete_id).await? {
            // Deleted concurrently
            return Err(AppError::NotFound(format!(
                "Session for athlete {}",
                athlete_id
            )));
        }

        tracing::info!(athlete_id, requester = ?requester, "Session deleted");
        Ok(())
    }

    /// Revoke the grant behind a session being deleted.
    ///
    /// Upstream failures are logged and swallowed. A record that cannot be
    /// decrypted is an error: the caller sees it instead of silently
    /// deleting something we could not inspect.
    async fn revoke_best_effort(&self, session: &Session) -> Result<(), AppError> {
        let athlete_id = session.athlete_id.as_str();
        let mut access_token = self.cipher.decrypt(&session.access_token)?;

        let expiry_cutoff = Utc::now().timestamp() + TOKEN_REFRESH_MARGIN_SECS;
        if session.expires_at <= expiry_cutoff {
            // In-memory only; the record is about to go away
            let refresh_token = self.cipher.decrypt(&session.refresh_token)?;
            match self.provider.refresh(&refresh_token).await {
                Ok(tokens) => access_token = tokens.access_token,
                Err(e) => {
                    tracing::warn!(
                        athlete_id,
                        error = %e,
                        "Failed to refresh token for deauthorization (attempting with old token)"
                    );
                }
            }
        }

        if let Err(e) = self.provider.revoke(&access_token).await {
            tracing::warn!(
                athlete_id,
                error = %e,
                already_revoked = e.is_already_revoked(),
                "Strava deauthorization failed during deletion, deleting anyway"
            );
        }
        Ok(())
    }

    // ─── Background Operations ───────────────────────────────────

    /// Refresh and deauthorize every session idle for longer than the
    /// inactivity threshold.
    ///
    /// Only candidate selection can fail the sweep as a whole; per-session
    /// failures are logged and counted in the report.
    pub async fn sweep(&self) -> Result<SweepReport, AppError> {
        let started_at = now_millis();
        let cutoff = started_at - self.policy.inactivity_threshold;

        let candidates = self.store.find_inactive(cutoff).await?;
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            tracing::debug!("Inactivity sweep found no candidates");
            return Ok(report);
        }

        tracing::info!(count = candidates.len(), "Starting inactivity sweep");

        let outcomes: Vec<CandidateOutcome> = stream::iter(candidates)
            .map(|candidate| self.process_candidate(candidate.athlete_id, cutoff))
            .buffer_unordered(self.policy.sweep_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            report.record(outcome);
        }

        tracing::info!(
            candidates = report.candidates,
            deauthorized = report.deauthorized,
            skipped = report.skipped,
            failed = report.failed,
            "Inactivity sweep complete"
        );
        Ok(report)
    }

    async fn process_candidate(&self, athlete_id: String, cutoff: DateTime<Utc>) -> CandidateOutcome {
        match self.deauthorize_inactive(&athlete_id, cutoff).await {
            Ok(true) => {
                tracing::info!(athlete_id = %athlete_id, "Inactive session deauthorized");
                CandidateOutcome::Deauthorized
            }
            Ok(false) => {
                tracing::debug!(athlete_id = %athlete_id, "Sweep candidate no longer eligible");
                CandidateOutcome::Skipped
            }
            Err((step, e)) => {
                tracing::warn!(
                    athlete_id = %athlete_id,
                    step = %step,
                    error = %e,
                    "Sweep step failed, session stays active until next sweep"
                );
                CandidateOutcome::Failed(step)
            }
        }
    }

    /// Steps 1-5 for one candidate. `Ok(false)` means it was skipped.
    async fn deauthorize_inactive(
        &self,
        athlete_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, (SweepStep, AppError)> {
        let step = |at: SweepStep| move |e: AppError| (at, e);

        let Some(session) = self
            .store
            .find(athlete_id)
            .await
            .map_err(step(SweepStep::Reload))?
        else {
            return Ok(false);
        };
        if !session.is_sweep_candidate(cutoff) {
            return Ok(false);
        }

        let refresh_token = self
            .cipher
            .decrypt(&session.refresh_token)
            .map_err(step(SweepStep::Decrypt))?;

        let tokens = self
            .provider
            .refresh(&refresh_token)
            .await
            .map_err(step(SweepStep::Refresh))?;

        // Persist before revoking so a crash cannot lose the new refresh token.
        // The old refresh token is spent now, so the new pair is stored even
        // if the athlete came back while the refresh was in flight. Only the
        // credential fields are written; `last_activity` belongs to touch.
        let (access_enc, refresh_enc) = self
            .cipher
            .encrypt_tokens(&tokens.access_token, &tokens.refresh_token)
            .map_err(step(SweepStep::PersistRefresh))?;
        let stored = self
            .store
            .update_tokens(athlete_id, access_enc, refresh_enc, tokens.expires_at)
            .await
            .map_err(step(SweepStep::PersistRefresh))?;
        if !stored {
            // Deleted while refreshing
            return Ok(false);
        }

        match self
            .store
            .find(athlete_id)
            .await
            .map_err(step(SweepStep::Reload))?
        {
            Some(latest) if latest.is_sweep_candidate(cutoff) => {}
            _ => return Ok(false),
        }

        self.provider
            .revoke(&tokens.access_token)
            .await
            .map_err(step(SweepStep::Revoke))?;

        // A record deleted while we were revoking has nothing left to mark
        self.store
            .mark_deauthorized(athlete_id, now_millis())
            .await
            .map_err(step(SweepStep::PersistDeauthorization))?;

        Ok(true)
    }

    /// Delete sessions older than the absolute age ceiling, regardless of activity.
    pub async fn evict_expired(&self) -> Result<usize, AppError> {
        let ceiling = now_millis() - self.policy.max_session_age;
        let evicted = self.store.delete_created_before(ceiling).await?;
        if evicted > 0 {
            tracing::info!(evicted, "Evicted sessions past maximum age");
        }
        Ok(evicted)
    }
}
