//! Counting semaphore backed by the native POSIX semaphore facility
//!
//! This crate wraps a single-process, unnamed POSIX semaphore (`sem_t`) and
//! exposes it with a small, strongly-typed API.
//!
//! # Primitives
//!
//! - [`Semaphore`] - Counting semaphore with blocking, non-blocking and timed waits
//! - [`Permit`] - RAII guard that signals the semaphore when dropped
//! - [`Deadline`] - Absolute wall-clock deadline in the form `sem_timedwait` expects
//!
//! # Error model
//!
//! Only two outcomes are recoverable: [`TryWaitError::WouldBlock`] and
//! [`TimedWaitError::TimedOut`]. A failing platform call under valid arguments
//! is a broken contract and aborts the process. Interrupted waits (`EINTR`)
//! are retried internally and never reach the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use posix_sem::Semaphore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let sem = Arc::new(Semaphore::new(0));
//!
//! let waiter = {
//!     let sem = Arc::clone(&sem);
//!     std::thread::spawn(move || sem.wait())
//! };
//!
//! sem.signal();
//! waiter.join().unwrap();
//!
//! // Nothing left: a bounded wait reports a timeout
//! assert!(sem.timed_wait(Duration::from_millis(1)).is_err());
//! ```

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
compile_error!(
    "posix-sem requires unnamed POSIX semaphores with sem_timedwait \
     (supported targets: linux, android, freebsd)"
);

mod deadline;
mod error;
mod semaphore;

pub use deadline::Deadline;
pub use error::{TimedWaitError, TryWaitError};
pub use semaphore::{Permit, Semaphore, MAX_VALUE};
