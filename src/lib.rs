// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava session lifecycle service.
//!
//! Stores Strava OAuth credentials per athlete (encrypted at rest), tracks
//! athlete activity, and periodically refreshes and deauthorizes sessions
//! that have gone idle.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{SessionManager, SweepScheduler};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub manager: Arc<SessionManager>,
    pub scheduler: Arc<SweepScheduler>,
}
