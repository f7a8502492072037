// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use strava_sessions::config::Config;
use strava_sessions::db::{FirestoreDb, MemoryStore, SessionStore};
use strava_sessions::routes::create_router;
use strava_sessions::services::{
    CredentialCipher, LifecyclePolicy, SessionManager, StravaClient, SweepScheduler,
};
use strava_sessions::time_utils::now_millis;
use strava_sessions::AppState;
use wiremock::MockServer;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique athlete ID for test isolation against a shared emulator.
#[allow(dead_code)]
pub fn unique_athlete_id() -> String {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}{:03}", nanos, COUNTER.fetch_add(1, Ordering::Relaxed) % 1000)
}

/// App wired to an in-memory store and a mock Strava server.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub strava: MockServer,
}

#[allow(dead_code)]
impl TestApp {
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn cipher(&self) -> CredentialCipher {
        CredentialCipher::new(&self.state.config.token_encryption_key).unwrap()
    }

    /// Push a session's last activity `days` into the past.
    pub async fn age_session(&self, athlete_id: &str, days: i64) {
        let mut session = self.store.find(athlete_id).await.unwrap().unwrap();
        session.last_activity = now_millis() - chrono::Duration::days(days);
        self.store.insert_raw(session);
    }
}

/// Create a test app. The sweep scheduler is constructed but not started.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let strava = MockServer::start().await;
    let store = MemoryStore::new();

    let client = StravaClient::with_endpoints(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        Duration::from_secs(2),
        format!("{}/oauth/token", strava.uri()),
        format!("{}/oauth/deauthorize", strava.uri()),
    )
    .unwrap();

    let manager = Arc::new(SessionManager::new(
        Arc::new(store.clone()),
        Arc::new(client),
        CredentialCipher::new(&config.token_encryption_key).unwrap(),
        LifecyclePolicy::from_config(&config),
    ));
    let scheduler = Arc::new(SweepScheduler::new(manager.clone()));

    let state = Arc::new(AppState {
        config,
        manager,
        scheduler,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        strava,
    }
}

/// JSON request builder.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Body for creating a session with the given tokens.
#[allow(dead_code)]
pub fn session_body(athlete_id: &str, access_token: &str, refresh_token: &str) -> serde_json::Value {
    serde_json::json!({
        "athleteId": athlete_id,
        "firstname": "Test",
        "lastname": "Athlete",
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "expiresAt": chrono::Utc::now().timestamp() + 6 * 3600
    })
}
