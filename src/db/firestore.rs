// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing the session store.
//!
//! Sessions live in the `sessions` collection, one document per athlete,
//! keyed by the URL-encoded athlete ID. Timestamps are fixed-width RFC3339
//! strings so range filters and ordering work on the string values.

use crate::db::{collections, SessionStore};
use crate::error::AppError;
use crate::models::{EncryptedSecret, NewSession, Session, SessionSummary};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

/// Document ID for an athlete. Athlete IDs are opaque and may contain `/`.
fn doc_id(athlete_id: &str) -> String {
    urlencoding::encode(athlete_id).into_owned()
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. All database operations return an error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn write(&self, session: &Session) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SESSIONS)
            .document_id(doc_id(&session.athlete_id))
            .object(session)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Write only `fields` of an existing document. Fails rather than
    /// recreating a document that was deleted in the meantime.
    async fn write_fields(&self, session: &Session, fields: &[&str]) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields.iter().copied())
            .in_col(collections::SESSIONS)
            .precondition(firestore::FirestoreWritePrecondition::Exists(true))
            .document_id(doc_id(&session.athlete_id))
            .object(session)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete documents by athlete ID in transactional batches.
    async fn batch_delete(&self, athlete_ids: &[String]) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in athlete_ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for athlete_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collections::SESSIONS)
                    .document_id(doc_id(athlete_id))
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add session deletion to transaction: {}",
                            e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl SessionStore for FirestoreDb {
    async fn upsert(&self, new: NewSession) -> Result<Session, AppError> {
        // Fetch-modify-write so `created_at` survives re-logins
        let existing = self.find(&new.athlete_id).await?;
        let session = new.into_session(existing.as_ref());
        self.write(&session).await?;
        Ok(session)
    }

    async fn find(&self, athlete_id: &str) -> Result<Option<Session>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SESSIONS)
            .obj()
            .one(&doc_id(athlete_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        let cutoff_str = format_utc_rfc3339(cutoff);

        let stale: Vec<Session> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(move |q| q.for_all([q.field("last_activity").less_than(cutoff_str.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Firestore cannot match documents missing `is_active`, so the active
        // state is filtered here rather than in the query.
        Ok(stale
            .into_iter()
            .filter(|s| s.is_sweep_candidate(cutoff))
            .collect())
    }

    async fn list_summaries(&self) -> Result<Vec<SessionSummary>, AppError> {
        let sessions: Vec<Session> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .order_by([(
                "last_activity",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(sessions.iter().map(Session::summary).collect())
    }

    async fn save(&self, session: &Session) -> Result<(), AppError> {
        self.write(session).await
    }

    async fn update_tokens(
        &self,
        athlete_id: &str,
        access_token: EncryptedSecret,
        refresh_token: EncryptedSecret,
        expires_at: i64,
    ) -> Result<bool, AppError> {
        let Some(mut session) = self.find(athlete_id).await? else {
            return Ok(false);
        };

        session.access_token = access_token;
        session.refresh_token = refresh_token;
        session.expires_at = expires_at;
        self.write_fields(&session, &["access_token", "refresh_token", "expires_at"])
            .await?;
        Ok(true)
    }

    async fn mark_deauthorized(
        &self,
        athlete_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let Some(mut session) = self.find(athlete_id).await? else {
            return Ok(false);
        };

        session.is_active = Some(false);
        session.deauthorized_at = Some(at);
        self.write_fields(&session, &["is_active", "deauthorized_at"])
            .await?;
        Ok(true)
    }

    async fn touch(&self, athlete_id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let Some(mut session) = self.find(athlete_id).await? else {
            return Ok(false);
        };

        if at > session.last_activity {
            session.last_activity = at;
            self.write_fields(&session, &["last_activity"]).await?;
        }
        Ok(true)
    }

    async fn delete(&self, athlete_id: &str) -> Result<bool, AppError> {
        if self.find(athlete_id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::SESSIONS)
            .document_id(doc_id(athlete_id))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }

    async fn delete_created_before(&self, ceiling: DateTime<Utc>) -> Result<usize, AppError> {
        let ceiling_str = format_utc_rfc3339(ceiling);

        let expired: Vec<Session> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(move |q| q.for_all([q.field("created_at").less_than(ceiling_str.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ids: Vec<String> = expired.into_iter().map(|s| s.athlete_id).collect();
        self.batch_delete(&ids).await?;

        tracing::debug!(count = ids.len(), "Evicted sessions past absolute age");
        Ok(ids.len())
    }
}
