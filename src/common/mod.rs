//! Common utilities shared by the CLI, the bridge, and the library

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Lock a std mutex, recovering the data if a holder panicked
///
/// None of the state guarded this way is left half-updated across a panic
/// point, so the inner value is always usable.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
