// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cipher;
pub mod scheduler;
pub mod sessions;
pub mod strava;

pub use cipher::CredentialCipher;
pub use scheduler::{PassReport, SweepScheduler};
pub use sessions::{
    CreateSession, LifecyclePolicy, Requester, SessionManager, SweepReport, SweepStep,
};
pub use strava::{OAuthProvider, StravaClient, TokenSet};
