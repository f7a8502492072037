// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, request logging).

pub mod auth;
pub mod origin;

pub use auth::{require_admin, require_requester};
pub use origin::log_origin;
