//! Counting semaphore over a native POSIX unnamed semaphore
//!
//! The native handle is bound to its memory address for its whole lifetime,
//! so it is boxed once at construction and never copied. Sharing across
//! threads happens by reference (`&Semaphore`, `Arc<Semaphore>`).
//!
//! # Example
//!
//! ```rust
//! use posix_sem::{Semaphore, TryWaitError};
//!
//! let sem = Semaphore::new(2);
//! assert!(sem.try_wait().is_ok());
//! assert!(sem.try_wait().is_ok());
//! assert_eq!(sem.try_wait(), Err(TryWaitError::WouldBlock));
//!
//! sem.signal();
//! assert!(sem.try_wait().is_ok());
//! ```

use crate::deadline::Deadline;
use crate::error::{fatal, TimedWaitError, TryWaitError};
use std::cell::UnsafeCell;
use std::fmt;
use std::io;
use std::time::Duration;

/// Largest counter value the platform accepts (`SEM_VALUE_MAX`)
pub const MAX_VALUE: u32 = i32::MAX as u32;

/// A counting semaphore backed by the operating system's `sem_t`
///
/// The counter is owned by the platform and never read by this wrapper; the
/// only way to observe it is through the outcome of the wait operations.
///
/// # Design
///
/// - **Stable address**: the `sem_t` lives in a `Box` so moving the wrapper never moves the handle
/// - **Not `Clone`**: the handle must not be duplicated; share it by reference or `Arc`
/// - **Exactly-once teardown**: `sem_destroy` runs in `Drop`, which ownership guarantees
///   happens once and only after every borrow (and so every waiter) is gone
/// - **No wake order**: which waiter a `signal` releases is up to the platform
pub struct Semaphore {
    /// Native handle; mutated only by the platform through the calls below
    handle: Box<UnsafeCell<libc::sem_t>>,
}

// SAFETY: sem_t is designed for concurrent use from many threads through a
// stable pointer, and the box keeps that pointer fixed until Drop.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Create a semaphore whose counter starts at `initial`
    ///
    /// # Panics
    ///
    /// Panics if `initial` exceeds [`MAX_VALUE`]. This is an ordinary panic on
    /// a caller bug, checked before any native call: it unwinds unless the
    /// build uses `panic = "abort"`, and no native resource exists yet to leak.
    /// Failures of the native call itself abort the process instead.
    ///
    /// # Example
    ///
    /// ```rust
    /// use posix_sem::Semaphore;
    ///
    /// let sem = Semaphore::new(0);
    /// assert!(sem.try_wait().is_err());
    /// ```
    #[must_use]
    pub fn new(initial: u32) -> Self {
        assert!(
            initial <= MAX_VALUE,
            "Semaphore initial value exceeds SEM_VALUE_MAX"
        );

        // SAFETY: sem_t is plain old data; sem_init below fully initializes it.
        let handle = Box::new(UnsafeCell::new(unsafe { std::mem::zeroed::<libc::sem_t>() }));

        // SAFETY: the pointer is valid, uniquely owned, and pshared = 0 keeps the
        // semaphore private to this process.
        if unsafe { libc::sem_init(handle.get(), 0, initial) } != 0 {
            fatal("sem_init", &io::Error::last_os_error());
        }

        Self { handle }
    }

    /// Release the native resource
    ///
    /// Equivalent to dropping the semaphore; spelled out for call sites that
    /// want the teardown to be visible.
    pub fn destroy(self) {
        drop(self);
    }

    /// Decrement the counter, blocking while it is zero
    ///
    /// Interruptions by unrelated signal handlers are retried; the call only
    /// returns once a unit has been taken.
    pub fn wait(&self) {
        loop {
            // SAFETY: the handle is initialized and outlives &self.
            if unsafe { libc::sem_wait(self.raw()) } == 0 {
                return;
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => tracing::trace!("sem_wait interrupted, retrying"),
                _ => fatal("sem_wait", &err),
            }
        }
    }

    /// Decrement the counter if it is positive, without blocking
    ///
    /// # Errors
    ///
    /// Returns [`TryWaitError::WouldBlock`] if the counter is zero. The counter
    /// is not modified in that case.
    pub fn try_wait(&self) -> Result<(), TryWaitError> {
        loop {
            // SAFETY: the handle is initialized and outlives &self.
            if unsafe { libc::sem_trywait(self.raw()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Err(TryWaitError::WouldBlock),
                Some(libc::EINTR) => tracing::trace!("sem_trywait interrupted, retrying"),
                _ => fatal("sem_trywait", &err),
            }
        }
    }

    /// Decrement the counter, blocking for at most `timeout`
    ///
    /// A zero timeout is an instantaneous check. The deadline is fixed when
    /// the call starts, so interrupted waits resume against the same instant.
    ///
    /// # Errors
    ///
    /// Returns [`TimedWaitError::TimedOut`] if no unit became available before
    /// the deadline. The counter is not modified in that case.
    ///
    /// # Example
    ///
    /// ```rust
    /// use posix_sem::{Semaphore, TimedWaitError};
    /// use std::time::Duration;
    ///
    /// let sem = Semaphore::new(0);
    /// assert_eq!(sem.timed_wait(Duration::ZERO), Err(TimedWaitError::TimedOut));
    /// ```
    pub fn timed_wait(&self, timeout: Duration) -> Result<(), TimedWaitError> {
        self.wait_deadline(&Deadline::after(timeout))
    }

    /// [`timed_wait`](Self::timed_wait) with the timeout given in milliseconds
    ///
    /// # Errors
    ///
    /// Returns [`TimedWaitError::TimedOut`] if the timeout elapsed first.
    pub fn timed_wait_ms(&self, timeout_ms: u64) -> Result<(), TimedWaitError> {
        self.timed_wait(Duration::from_millis(timeout_ms))
    }

    /// Decrement the counter, blocking until `deadline` at the latest
    ///
    /// # Errors
    ///
    /// Returns [`TimedWaitError::TimedOut`] once the deadline has passed
    /// without a unit becoming available.
    pub fn wait_deadline(&self, deadline: &Deadline) -> Result<(), TimedWaitError> {
        let abstime = deadline.as_timespec();
        loop {
            // SAFETY: the handle is initialized and outlives &self; abstime has
            // tv_nsec in [0, 1e9) by construction of Deadline.
            if unsafe { libc::sem_timedwait(self.raw(), &abstime) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ETIMEDOUT) => return Err(TimedWaitError::TimedOut),
                Some(libc::EINTR) => tracing::trace!("sem_timedwait interrupted, retrying"),
                _ => fatal("sem_timedwait", &err),
            }
        }
    }

    /// Increment the counter, releasing one blocked waiter if there is any
    pub fn signal(&self) {
        // SAFETY: the handle is initialized and outlives &self.
        if unsafe { libc::sem_post(self.raw()) } != 0 {
            fatal("sem_post", &io::Error::last_os_error());
        }
    }

    /// Block until a unit is available and hold it until the permit drops
    pub fn acquire(&self) -> Permit<'_> {
        self.wait();
        Permit { semaphore: self }
    }

    /// Take a unit if one is available, held until the permit drops
    ///
    /// # Errors
    ///
    /// Returns [`TryWaitError::WouldBlock`] if the counter is zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// use posix_sem::Semaphore;
    ///
    /// let sem = Semaphore::new(1);
    ///
    /// let permit = sem.try_acquire().unwrap();
    /// assert!(sem.try_acquire().is_err());
    ///
    /// drop(permit);
    /// assert!(sem.try_acquire().is_ok());
    /// ```
    pub fn try_acquire(&self) -> Result<Permit<'_>, TryWaitError> {
        self.try_wait()?;
        Ok(Permit { semaphore: self })
    }

    /// Take a unit within `timeout`, held until the permit drops
    ///
    /// # Errors
    ///
    /// Returns [`TimedWaitError::TimedOut`] if the timeout elapsed first.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Permit<'_>, TimedWaitError> {
        self.timed_wait(timeout)?;
        Ok(Permit { semaphore: self })
    }

    fn raw(&self) -> *mut libc::sem_t {
        self.handle.get()
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: &mut self proves no other thread is inside a call on this handle.
        if unsafe { libc::sem_destroy(self.raw()) } != 0 {
            fatal("sem_destroy", &io::Error::last_os_error());
        }
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore").finish_non_exhaustive()
    }
}

/// RAII guard for one unit taken from a [`Semaphore`]
///
/// Dropping the permit signals the semaphore, returning the unit.
#[must_use = "dropping the permit immediately signals the semaphore"]
#[derive(Debug)]
pub struct Permit<'a> {
    /// Semaphore the unit was taken from
    semaphore: &'a Semaphore,
}

impl Permit<'_> {
    /// Keep the unit: the semaphore is not signalled when this permit goes away
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_semaphore_new_and_drain() {
        let sem = Semaphore::new(3);
        for _ in 0..3 {
            assert_eq!(sem.try_wait(), Ok(()));
        }
        assert_eq!(sem.try_wait(), Err(TryWaitError::WouldBlock));
    }

    #[test]
    fn test_semaphore_zero_initial() {
        let sem = Semaphore::new(0);
        assert_eq!(sem.try_wait(), Err(TryWaitError::WouldBlock));
        // A failed try_wait leaves the counter alone
        sem.signal();
        assert_eq!(sem.try_wait(), Ok(()));
        assert_eq!(sem.try_wait(), Err(TryWaitError::WouldBlock));
    }

    #[test]
    fn test_semaphore_wait_consumes_unit() {
        let sem = Semaphore::new(1);
        sem.wait();
        assert_eq!(sem.try_wait(), Err(TryWaitError::WouldBlock));
    }

    #[test]
    fn test_timed_wait_zero_times_out_immediately() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert_eq!(sem.timed_wait(Duration::ZERO), Err(TimedWaitError::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timed_wait_one_ms_times_out() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert_eq!(sem.timed_wait_ms(1), Err(TimedWaitError::TimedOut));
        assert!(start.elapsed() >= Duration::from_millis(1));
    }

    #[test]
    fn test_timed_wait_zero_succeeds_when_available() {
        let sem = Semaphore::new(1);
        assert_eq!(sem.timed_wait(Duration::ZERO), Ok(()));
        assert_eq!(sem.timed_wait(Duration::ZERO), Err(TimedWaitError::TimedOut));
    }

    #[test]
    fn test_timed_wait_huge_timeout_succeeds_when_available() {
        let sem = Semaphore::new(1);
        assert_eq!(sem.timed_wait(Duration::MAX), Ok(()));
    }

    #[test]
    fn test_wait_deadline_in_the_past() {
        let sem = Semaphore::new(0);
        let past = Deadline::at(std::time::UNIX_EPOCH);
        assert_eq!(sem.wait_deadline(&past), Err(TimedWaitError::TimedOut));
    }

    #[test]
    fn test_signal_releases_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let woke = Arc::new(AtomicBool::new(false));

        let handle = {
            let sem = Arc::clone(&sem);
            let woke = Arc::clone(&woke);
            std::thread::spawn(move || {
                sem.wait();
                woke.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!woke.load(Ordering::SeqCst));

        sem.signal();
        handle.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
        assert_eq!(sem.try_wait(), Err(TryWaitError::WouldBlock));
    }

    #[test]
    fn test_timed_wait_released_by_signal() {
        let sem = Semaphore::new(0);
        std::thread::scope(|s| {
            let waiter = s.spawn(|| sem.timed_wait(Duration::from_secs(10)));
            std::thread::sleep(Duration::from_millis(10));
            sem.signal();
            assert_eq!(waiter.join().unwrap(), Ok(()));
        });
    }

    #[test]
    fn test_permit_drop_signals() {
        let sem = Semaphore::new(1);
        {
            let _permit = sem.acquire();
            assert_eq!(sem.try_wait(), Err(TryWaitError::WouldBlock));
        }
        assert_eq!(sem.try_wait(), Ok(()));
    }

    #[test]
    fn test_permit_forget_keeps_unit() {
        let sem = Semaphore::new(1);
        sem.try_acquire().unwrap().forget();
        assert!(sem.try_acquire().is_err());
    }

    #[test]
    fn test_acquire_timeout() {
        let sem = Semaphore::new(1);
        let permit = sem.acquire_timeout(Duration::from_millis(5)).unwrap();
        assert_eq!(
            sem.acquire_timeout(Duration::from_millis(1)).map(|_| ()),
            Err(TimedWaitError::TimedOut)
        );
        drop(permit);
        assert!(sem.acquire_timeout(Duration::ZERO).is_ok());
    }

    #[test]
    fn test_semaphore_moves_without_moving_handle() {
        let sem = Semaphore::new(1);
        let boxed = Box::new(sem);
        let moved = *boxed;
        assert_eq!(moved.try_wait(), Ok(()));
        moved.destroy();
    }

    #[test]
    fn test_semaphore_max_value() {
        let sem = Semaphore::new(MAX_VALUE);
        assert_eq!(sem.try_wait(), Ok(()));
        sem.signal();
    }

    #[test]
    #[should_panic(expected = "Semaphore initial value exceeds SEM_VALUE_MAX")]
    fn test_semaphore_initial_too_large_panics() {
        let _sem = Semaphore::new(MAX_VALUE + 1);
    }

    #[test]
    fn test_debug_is_opaque() {
        let sem = Semaphore::new(5);
        assert_eq!(format!("{sem:?}"), "Semaphore { .. }");
    }
}
