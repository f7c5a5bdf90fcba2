//! Error types for semaphore operations

use std::io;
use thiserror::Error;

/// Outcome of a non-blocking wait that could not decrement the counter
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryWaitError {
    /// The counter is currently zero; it was left unchanged
    #[error("semaphore unavailable: operation would block")]
    WouldBlock,
}

/// Outcome of a timed wait whose deadline passed first
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedWaitError {
    /// The deadline elapsed before a unit became available; the counter was left unchanged
    #[error("semaphore wait timed out")]
    TimedOut,
}

/// Abort the process after a platform call failed under arguments this crate guarantees valid
///
/// Such a failure means the handle was misused (for example destroyed while in use)
/// or the platform is in an unrecoverable state, so there is nothing a caller
/// could do with the error.
#[cold]
pub(crate) fn fatal(operation: &'static str, err: &io::Error) -> ! {
    tracing::error!(
        operation,
        errno = err.raw_os_error(),
        "native semaphore call failed: {err}"
    );
    eprintln!("posix-sem: {operation} failed: {err}");
    std::process::abort()
}
