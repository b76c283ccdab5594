//! Mutex helpers.

use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex, recovering the inner value if a previous holder panicked.
///
/// The guarded state (ledger connection, in-memory platform) stays valid
/// across a panic in an unrelated critical section.
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mutex was poisoned, recovering");
            metrics::counter!("autosnap_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}
