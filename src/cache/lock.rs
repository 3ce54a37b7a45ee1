//! Poison recovery for the cache's interior locks.
//!
//! A panic while holding a cache lock must not wedge every later request;
//! the guard is recovered and the incident logged. Recovered state is at
//! worst stale, which the TTL already tolerates.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(source, op, "Recovered poisoned cache write lock");
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(source, op, "Recovered poisoned cache queue lock");
        poisoned.into_inner()
    })
}
