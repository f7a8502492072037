// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with FIRESTORE_EMULATOR_HOST pointing at the emulator; otherwise
//! they are skipped.
//!
//! The emulator is shared between tests, so every test uses unique athlete
//! IDs and only asserts on its own documents.

use chrono::Duration;
use strava_sessions::db::SessionStore;
use strava_sessions::models::{EncryptedSecret, NewSession};
use strava_sessions::time_utils::now_millis;

mod common;
use common::{test_db, unique_athlete_id};

fn new_session(athlete_id: &str, tag: &str) -> NewSession {
    NewSession {
        athlete_id: athlete_id.to_string(),
        firstname: Some("Test".to_string()),
        lastname: Some("Athlete".to_string()),
        access_token: EncryptedSecret {
            nonce: format!("nonce-a-{}", tag),
            ciphertext: format!("ct-a-{}", tag),
        },
        refresh_token: EncryptedSecret {
            nonce: format!("nonce-r-{}", tag),
            ciphertext: format!("ct-r-{}", tag),
        },
        expires_at: 1_900_000_000,
        now: now_millis(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION CRUD
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_upsert_and_find() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = unique_athlete_id();

    assert!(db.find(&athlete_id).await.unwrap().is_none());

    let first = db.upsert(new_session(&athlete_id, "1")).await.unwrap();
    let stored = db.find(&athlete_id).await.unwrap().unwrap();
    assert_eq!(stored, first);

    // Second upsert overwrites tokens but keeps created_at
    let second = db.upsert(new_session(&athlete_id, "2")).await.unwrap();
    let stored = db.find(&athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.ciphertext, "ct-r-2");
    assert_eq!(stored.created_at, first.created_at);
    assert_eq!(stored.last_activity, second.last_activity);

    assert!(db.delete(&athlete_id).await.unwrap());
    assert!(!db.delete(&athlete_id).await.unwrap());
}

#[tokio::test]
async fn test_athlete_id_with_slash() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = format!("team/{}", unique_athlete_id());

    db.upsert(new_session(&athlete_id, "1")).await.unwrap();
    let stored = db.find(&athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.athlete_id, athlete_id);
    db.delete(&athlete_id).await.unwrap();
}

#[tokio::test]
async fn test_touch() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = unique_athlete_id();

    assert!(!db.touch(&athlete_id, now_millis()).await.unwrap());
    assert!(db.find(&athlete_id).await.unwrap().is_none());

    db.upsert(new_session(&athlete_id, "1")).await.unwrap();
    let later = now_millis() + Duration::minutes(5);
    assert!(db.touch(&athlete_id, later).await.unwrap());
    assert_eq!(
        db.find(&athlete_id).await.unwrap().unwrap().last_activity,
        later
    );

    // Never moves backwards
    db.touch(&athlete_id, later - Duration::hours(1)).await.unwrap();
    assert_eq!(
        db.find(&athlete_id).await.unwrap().unwrap().last_activity,
        later
    );

    db.delete(&athlete_id).await.unwrap();
}

#[tokio::test]
async fn test_field_scoped_updates() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = unique_athlete_id();

    assert!(!db
        .mark_deauthorized(&athlete_id, now_millis())
        .await
        .unwrap());
    assert!(db.find(&athlete_id).await.unwrap().is_none());

    db.upsert(new_session(&athlete_id, "1")).await.unwrap();
    let later = now_millis() + Duration::minutes(5);
    db.touch(&athlete_id, later).await.unwrap();

    let fresh = new_session(&athlete_id, "2");
    assert!(db
        .update_tokens(&athlete_id, fresh.access_token, fresh.refresh_token, 42)
        .await
        .unwrap());
    let deauthorized_at = now_millis();
    assert!(db
        .mark_deauthorized(&athlete_id, deauthorized_at)
        .await
        .unwrap());

    let stored = db.find(&athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.last_activity, later);
    assert_eq!(stored.refresh_token.ciphertext, "ct-r-2");
    assert_eq!(stored.expires_at, 42);
    assert_eq!(stored.is_active, Some(false));
    assert_eq!(stored.deauthorized_at, Some(deauthorized_at));

    db.delete(&athlete_id).await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// SWEEP QUERIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_find_inactive_filters_state() {
    require_emulator!();

    let db = test_db().await;
    let stale = unique_athlete_id();
    let legacy = unique_athlete_id();
    let revoked = unique_athlete_id();
    let fresh = unique_athlete_id();

    for id in [&stale, &legacy, &revoked, &fresh] {
        db.upsert(new_session(id, "1")).await.unwrap();
    }

    let old = now_millis() - Duration::days(40);
    for id in [&stale, &legacy, &revoked] {
        let mut session = db.find(id).await.unwrap().unwrap();
        session.last_activity = old;
        if id == &legacy {
            session.is_active = None;
        }
        if id == &revoked {
            session.is_active = Some(false);
            session.deauthorized_at = Some(now_millis());
        }
        db.save(&session).await.unwrap();
    }

    let cutoff = now_millis() - Duration::days(30);
    let ids: Vec<String> = db
        .find_inactive(cutoff)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.athlete_id)
        .collect();

    assert!(ids.contains(&stale));
    assert!(ids.contains(&legacy), "records without is_active count as active");
    assert!(!ids.contains(&revoked));
    assert!(!ids.contains(&fresh));

    for id in [&stale, &legacy, &revoked, &fresh] {
        db.delete(id).await.unwrap();
    }
}

#[tokio::test]
async fn test_list_summaries_order() {
    require_emulator!();

    let db = test_db().await;
    let older = unique_athlete_id();
    let newer = unique_athlete_id();

    db.upsert(new_session(&older, "1")).await.unwrap();
    db.upsert(new_session(&newer, "1")).await.unwrap();
    db.touch(&newer, now_millis() + Duration::minutes(1))
        .await
        .unwrap();

    let ids: Vec<String> = db
        .list_summaries()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.athlete_id)
        .filter(|id| id == &older || id == &newer)
        .collect();
    assert_eq!(ids, vec![newer.clone(), older.clone()]);

    db.delete(&older).await.unwrap();
    db.delete(&newer).await.unwrap();
}

#[tokio::test]
async fn test_delete_created_before() {
    require_emulator!();

    let db = test_db().await;
    let ancient = unique_athlete_id();
    let recent = unique_athlete_id();

    db.upsert(new_session(&ancient, "1")).await.unwrap();
    db.upsert(new_session(&recent, "1")).await.unwrap();

    let mut session = db.find(&ancient).await.unwrap().unwrap();
    session.created_at = now_millis() - Duration::days(400);
    db.save(&session).await.unwrap();

    let evicted = db
        .delete_created_before(now_millis() - Duration::days(365))
        .await
        .unwrap();
    assert!(evicted >= 1);
    assert!(db.find(&ancient).await.unwrap().is_none());
    assert!(db.find(&recent).await.unwrap().is_some());

    db.delete(&recent).await.unwrap();
}
