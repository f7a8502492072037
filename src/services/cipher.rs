// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AES-256-GCM encryption of OAuth tokens at rest.
//!
//! The key is derived once at startup from the configured secret with
//! HKDF-SHA256. Every call to [`CredentialCipher::encrypt`] draws a fresh
//! random nonce; the GCM tag makes decryption with the wrong key (or of a
//! tampered record) fail instead of yielding garbage.

use crate::error::AppError;
use crate::models::EncryptedSecret;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

const HKDF_SALT: &[u8] = b"strava-sessions/token-encryption";
const HKDF_INFO: &[u8] = b"aes-256-gcm v1";

/// Symmetric cipher for stored credentials. Cheap to clone.
#[derive(Clone)]
pub struct CredentialCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Derive the AES key from a process-wide secret.
    pub fn new(secret: &[u8]) -> Result<Self, AppError> {
        let hk = hkdf::Hkdf::<sha2::Sha256>::new(Some(HKDF_SALT), secret);
        let mut key_bytes = [0u8; 32];
        hk.expand(HKDF_INFO, &mut key_bytes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HKDF expand failed: {}", e)))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid AES-256-GCM key")))?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a secret string under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, AppError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;

        let mut data = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut data,
            )
            .map_err(|_| AppError::Internal(anyhow::anyhow!("AES-GCM seal failed")))?;

        Ok(EncryptedSecret {
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(data),
        })
    }

    /// Decrypt an envelope produced by [`CredentialCipher::encrypt`].
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, AppError> {
        let nonce_vec = BASE64
            .decode(&secret.nonce)
            .map_err(|e| AppError::Decryption(format!("nonce is not base64: {}", e)))?;
        let nonce_bytes: [u8; NONCE_LEN] = nonce_vec.as_slice().try_into().map_err(|_| {
            AppError::Decryption(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce_vec.len()
            ))
        })?;

        let mut data = BASE64
            .decode(&secret.ciphertext)
            .map_err(|e| AppError::Decryption(format!("ciphertext is not base64: {}", e)))?;
        if data.len() < AES_256_GCM.tag_len() {
            return Err(AppError::Decryption(
                "ciphertext too short: missing tag".to_string(),
            ));
        }

        let plaintext = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut data,
            )
            .map_err(|_| {
                AppError::Decryption("authentication failed (wrong key or tampered)".to_string())
            })?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| AppError::Decryption(format!("plaintext is not UTF-8: {}", e)))
    }

    /// Helper to encrypt an access/refresh token pair before storing.
    pub fn encrypt_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(EncryptedSecret, EncryptedSecret), AppError> {
        Ok((self.encrypt(access_token)?, self.encrypt(refresh_token)?))
    }
}
