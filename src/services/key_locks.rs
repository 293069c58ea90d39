// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process keyed mutual exclusion.
//!
//! One `tokio::sync::Mutex` per key, created on demand and removed again once
//! no task holds or waits on it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = Arc<DashMap<String, Arc<Mutex<()>>>>;

#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: LockTable,
}

/// Holds every requested key until dropped.
pub struct KeyGuard {
    guards: Vec<OwnedMutexGuard<()>>,
    keys: Vec<String>,
    locks: LockTable,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock all `keys`. They are taken in sorted order so two callers sharing
    /// keys cannot deadlock.
    pub async fn lock_all(&self, keys: &[String]) -> KeyGuard {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }

        KeyGuard {
            guards,
            keys,
            locks: self.locks.clone(),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            // Only the table's own reference left: nobody holds or awaits it.
            self.locks
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}
