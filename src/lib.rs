// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity gateway: federated login and local token lifecycle.
//!
//! Accepts identity assertions from external OAuth/OIDC providers, resolves
//! them to one deduplicated local user, and issues, refreshes and revokes the
//! access/refresh token pairs other services authenticate with.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::TokenLifecycleManager;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub lifecycle: TokenLifecycleManager,
}
