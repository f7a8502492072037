// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session API routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::create_session_token;
use crate::middleware::{require_admin, require_requester};
use crate::models::SessionSummary;
use crate::services::{CreateSession, PassReport, Requester};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Session routes. Admin and owner checks are attached per route.
pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_only = middleware::from_fn_with_state(state.clone(), require_admin);
    let identified = middleware::from_fn_with_state(state, require_requester);

    Router::new()
        .route(
            "/api/sessions",
            post(create_session).merge(get(list_sessions).route_layer(admin_only.clone())),
        )
        .route(
            "/api/sessions/sweep",
            post(trigger_sweep).route_layer(admin_only),
        )
        .route("/api/sessions/{athlete_id}/check", get(check_session))
        .route("/api/sessions/{athlete_id}/activity", post(record_activity))
        .route(
            "/api/sessions/{athlete_id}",
            delete(delete_session).route_layer(identified),
        )
}

// ─── Create ──────────────────────────────────────────────────

/// Session creation request. Field names follow the web client
/// (`athleteId`, `accessToken`, ...); snake_case is accepted too. Missing
/// strings default to empty so they fail validation with a 400. Bodies that
/// do not parse at all are rejected as `AppError::Validation`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[serde(alias = "athleteId", default)]
    #[validate(length(min = 1, max = 64))]
    pub athlete_id: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(alias = "accessToken", default)]
    #[validate(length(min = 1))]
    pub access_token: String,
    #[serde(alias = "refreshToken", default)]
    #[validate(length(min = 1))]
    pub refresh_token: String,
    #[serde(alias = "expiresAt")]
    pub expires_at: i64,
}

/// Response for session creation.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreateSessionResponse {
    pub session: SessionSummary,
    /// JWT identifying the athlete for later owner-only calls
    pub session_token: String,
}

/// Create or update the session for an athlete after OAuth login.
async fn create_session(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(body), _): WithRejection<Json<CreateSessionRequest>, AppError>,
) -> Result<(StatusCode, Json<CreateSessionResponse>)> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session = state
        .manager
        .create_or_update(CreateSession {
            athlete_id: body.athlete_id,
            firstname: body.firstname,
            lastname: body.lastname,
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: body.expires_at,
        })
        .await?;

    let session_token = create_session_token(&session.athlete_id, &state.config.jwt_signing_key)
        .map_err(AppError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session,
            session_token,
        }),
    ))
}

// ─── Activity ────────────────────────────────────────────────

/// Check that a session exists, recording the check as activity.
async fn check_session(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<String>,
) -> Result<StatusCode> {
    state.manager.touch(&athlete_id).await?;
    Ok(StatusCode::OK)
}

/// Record athlete activity.
async fn record_activity(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<String>,
) -> Result<StatusCode> {
    state.manager.touch(&athlete_id).await?;
    Ok(StatusCode::OK)
}

// ─── Admin ───────────────────────────────────────────────────

async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SessionSummary>>> {
    Ok(Json(state.manager.list().await?))
}

/// Run a sweep pass now. 409 if one is already running.
async fn trigger_sweep(State(state): State<Arc<AppState>>) -> Result<Json<PassReport>> {
    let report = state.scheduler.run_once().await?;
    tracing::info!(
        deauthorized = report.sweep.deauthorized,
        failed = report.sweep.failed,
        evicted = report.evicted,
        "Manual sweep complete"
    );
    Ok(Json(report))
}

// ─── Deletion ────────────────────────────────────────────────

/// Response for session deletion.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteSessionResponse {
    pub success: bool,
}

/// Delete a session (admin, or the athlete themselves).
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(requester): Extension<Requester>,
    Path(athlete_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>> {
    state.manager.delete(&athlete_id, &requester).await?;
    Ok(Json(DeleteSessionResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_client_field_names() {
        let body: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "athleteId": "42",
            "firstname": "Ada",
            "accessToken": "at",
            "refreshToken": "rt",
            "expiresAt": 1_700_000_000i64
        }))
        .unwrap();
        assert_eq!(body.athlete_id, "42");
        assert_eq!(body.lastname, None);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_request_rejects_empty_tokens() {
        let body: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "athlete_id": "42",
            "access_token": "",
            "refresh_token": "rt",
            "expires_at": 0
        }))
        .unwrap();
        assert!(body.validate().is_err());
    }
}
