//! Synchronization utilities for robust mutex handling
//!
//! Two policies are offered. Hot paths that have no error channel (queue
//! insertion, the pump loop) recover the guard from a poisoned lock and log
//! the event. Everything else converts poisoning into the caller's error type.

use std::sync::{LockResult, Mutex, MutexGuard, PoisonError};

/// Handle poisoned mutex cases with consistent error handling
///
/// Converts a poison error into an application-specific error using the
/// provided constructor.
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use storcomm::core::sync::handle_mutex_poison;
/// use storcomm::communication::api::CommError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(
///     mutex.lock(),
///     |message| CommError::Synchronisation { message }
/// ).unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (mutex poisoned). This indicates a panic occurred while holding a lock. PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Lock a mutex, recovering the guard if a previous holder panicked
///
/// The protected data structures in this crate keep their invariants across
/// every individual mutation, so the state left behind by a panicking holder
/// is still consistent.
pub fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned: PoisonError<MutexGuard<'a, T>>| {
        log::warn!("Recovered poisoned lock: {}", what);
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct TestError {
        message: String,
    }

    fn poisoned_mutex() -> Arc<Mutex<i32>> {
        let mutex = Arc::new(Mutex::new(42));
        let mutex_clone = Arc::clone(&mutex);

        let _ = thread::spawn(move || {
            let _guard = mutex_clone.lock().unwrap();
            panic!("Intentional panic to poison mutex");
        })
        .join();

        mutex
    }

    #[test]
    fn test_handle_mutex_poison_success() {
        let mutex = Mutex::new(42);
        let result = handle_mutex_poison(mutex.lock(), |msg| TestError { message: msg });

        assert_eq!(*result.unwrap(), 42);
    }

    #[test]
    fn test_handle_mutex_poison_with_poisoned_mutex() {
        let mutex = poisoned_mutex();

        let result = handle_mutex_poison(mutex.lock(), |msg| TestError { message: msg });

        let error = result.unwrap_err();
        assert!(error.message.contains("mutex poisoned"));
    }

    #[test]
    fn test_lock_or_recover_returns_data_from_poisoned_mutex() {
        let mutex = poisoned_mutex();

        let mut guard = lock_or_recover(&mutex, "test");
        assert_eq!(*guard, 42);
        *guard = 7;
        drop(guard);

        assert_eq!(*lock_or_recover(&mutex, "test"), 7);
    }
}
