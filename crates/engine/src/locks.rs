// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key mutual exclusion.
//!
//! The local write path, the push engine and webhook ingress each take the
//! entity's key lock before touching its row and ledger, so exactly one of
//! them owns an entity at a time. Keys are held in a set; waiting callers
//! park on a condition variable until the holder's guard drops.
//!
//! Locks are not reentrant. Lock order is always key lock, then store.

use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::{Condvar, Mutex};

/// A family of locks addressed by key.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        KeyedLocks {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Block until `key` is free, then hold it until the guard drops.
    pub fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let mut held = self.held.lock();
        while held.contains(key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());
        KeyGuard {
            locks: self,
            key: key.clone(),
        }
    }

    /// Take `key` if it is free.
    pub fn try_lock(&self, key: &K) -> Option<KeyGuard<'_, K>> {
        let mut held = self.held.lock();
        if !held.insert(key.clone()) {
            return None;
        }
        Some(KeyGuard {
            locks: self,
            key: key.clone(),
        })
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.held.lock().contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        KeyedLocks::new()
    }
}

/// Holds one key of a [`KeyedLocks`].
#[derive(Debug)]
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.key);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
