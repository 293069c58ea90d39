// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod codec;
pub mod events;
pub mod key_locks;
pub mod lifecycle;
pub mod memory_store;
pub mod policy;
pub mod providers;
pub mod redis_store;
pub mod resolver;
pub mod session_store;

pub use codec::CredentialCodec;
pub use events::{BroadcastPublisher, EventPublisher, LogPublisher, RedisPublisher};
pub use lifecycle::TokenLifecycleManager;
pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use resolver::{IdentityResolver, Resolution};
pub use session_store::SessionStore;
