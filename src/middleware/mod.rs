// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, security, etc.).

pub mod assertion_auth;
pub mod auth;
pub mod security;

pub use assertion_auth::require_signed_assertion;
pub use auth::{require_auth, AuthUser};
