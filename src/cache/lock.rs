use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a cache mutex, recovering the guard if a callback panicked while holding it.
pub(crate) fn lock_or_recover<'a, T>(
    lock: &'a Mutex<T>,
    component: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            component,
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}
