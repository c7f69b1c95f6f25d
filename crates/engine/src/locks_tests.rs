// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn guard_releases_on_drop() {
    let locks = KeyedLocks::new();
    {
        let _guard = locks.lock(&1);
        assert!(locks.is_locked(&1));
        assert!(locks.try_lock(&1).is_none());
    }
    assert!(!locks.is_locked(&1));
    assert!(locks.try_lock(&1).is_some());
}

#[test]
fn distinct_keys_do_not_block() {
    let locks = KeyedLocks::new();
    let _a = locks.lock(&"a");
    assert!(locks.try_lock(&"b").is_some());
}

#[test]
fn same_key_is_serialized() {
    let locks = Arc::new(KeyedLocks::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            std::thread::spawn(move || {
                for _ in 0..5 {
                    let _guard = locks.lock(&42);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(1));
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!locks.is_locked(&42));
}
