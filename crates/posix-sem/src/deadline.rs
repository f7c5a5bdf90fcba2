//! Absolute deadlines for timed semaphore waits
//!
//! `sem_timedwait` takes an absolute `CLOCK_REALTIME` instant rather than a
//! relative timeout. A [`Deadline`] is computed once per wait so that retries
//! after an interrupted call keep targeting the same instant.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// An absolute wall-clock instant, stored in the shape of a `timespec`
///
/// Construction never wraps: a deadline that cannot be represented by the
/// platform's `time_t` saturates to [`Deadline::FAR_FUTURE`].
///
/// # Example
///
/// ```rust
/// use posix_sem::Deadline;
/// use std::time::Duration;
///
/// let soon = Deadline::after(Duration::from_millis(5));
/// assert!(soon < Deadline::FAR_FUTURE);
/// assert_eq!(Deadline::after(Duration::MAX), Deadline::FAR_FUTURE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    /// Whole seconds since the Unix epoch
    secs: libc::time_t,
    /// Sub-second part, always below one second
    nanos: u32,
}

impl Deadline {
    /// The latest representable deadline; waits against it are effectively unbounded
    pub const FAR_FUTURE: Self = Self {
        secs: libc::time_t::MAX,
        nanos: NANOS_PER_SEC - 1,
    };

    /// Deadline `timeout` from now
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self::offset_from(SystemTime::now(), timeout)
    }

    /// Deadline at the given wall-clock instant
    ///
    /// Instants before the Unix epoch clamp to the epoch, which has always passed.
    #[must_use]
    pub fn at(when: SystemTime) -> Self {
        Self::from_epoch_offset(Some(since_epoch(when)))
    }

    /// Whether the wall clock has reached this deadline
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        Self::at(SystemTime::now()) >= *self
    }

    fn offset_from(base: SystemTime, timeout: Duration) -> Self {
        Self::from_epoch_offset(since_epoch(base).checked_add(timeout))
    }

    fn from_epoch_offset(offset: Option<Duration>) -> Self {
        offset
            .and_then(|d| {
                let secs = libc::time_t::try_from(d.as_secs()).ok()?;
                Some(Self {
                    secs,
                    nanos: d.subsec_nanos(),
                })
            })
            .unwrap_or(Self::FAR_FUTURE)
    }

    /// The deadline as the `timespec` passed to `sem_timedwait`
    pub(crate) fn as_timespec(&self) -> libc::timespec {
        // SAFETY: timespec is plain old data; some targets carry padding fields
        // that are not nameable, so start from all-zero and fill in the two we own.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        ts.tv_sec = self.secs;
        // nanos < 1e9 fits every platform's tv_nsec type
        ts.tv_nsec = self.nanos as _;
        ts
    }
}

fn since_epoch(when: SystemTime) -> Duration {
    when.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
}
