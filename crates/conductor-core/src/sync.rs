//! Poison-tolerant locking.

use std::sync::{Mutex, MutexGuard};

/// Locks a `Mutex` without caring about poison.
///
/// Every shared structure in this workspace guards plain data, so a panic
/// while holding a guard leaves the data consistent enough to keep using.
/// The panic itself is the failure worth reporting; the poison flag is not.
pub trait IgnoreLock<T> {
    /// Acquires the lock, clearing any poison left by a panicked holder.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
