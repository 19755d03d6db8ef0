//! Poison-tolerant lock access.
//!
//! Listeners run caller code while cache state is shared. A panic there must
//! not wedge every later query, so a poisoned lock is logged and its data
//! used as-is.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        recovered(source, op, "read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        recovered(source, op, "write");
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        recovered(source, op, "lock");
        poisoned.into_inner()
    })
}

fn recovered(source: &'static str, op: &'static str, access: &'static str) {
    warn!(
        source,
        op,
        access,
        "Cache lock was poisoned by a panicking thread; continuing with its current state"
    );
}
