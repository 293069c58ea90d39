// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod event;
pub mod identity;
pub mod token;
pub mod user;

pub use event::{UserAction, UserEvent};
pub use identity::{ExternalIdentityAssertion, IdentityLink, Provider, ValidatedAssertion};
pub use token::{IssuedCredentials, SessionPayload, TokenKind, TokenPair, VerifiedToken};
pub use user::{User, UserSummary};
