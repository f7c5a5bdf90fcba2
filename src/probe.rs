//! Semaphore conformance scenarios
//!
//! Each scenario exercises one group of counting-semaphore properties against
//! the host's native facility and reports how many individual checks held.
//! The first check that fails stops the scenario with
//! [`ProbeError::ContractViolation`].
//!
//! # Scenarios
//!
//! - **capacity**: `v` try-waits succeed after `new(v)`, the next would block;
//!   one signal adds exactly one unit
//! - **timeout**: zero and bounded timed waits on an empty semaphore time out,
//!   never earlier than the bound; an available unit is taken without waiting.
//!   The bound is checked on the monotonic clock, so wall-clock steps during
//!   the run can skew it
//! - **fanout**: blocked waiters stay blocked until signalled and each signal
//!   releases exactly one of them
//! - **ping-pong**: two threads hand a token back and forth through two semaphores
//! - **bounded**: producers and consumers share a buffer whose free slots are
//!   counted by one semaphore and filled slots by another
//!
//! # Usage
//!
//! ```rust,no_run
//! use clap::Parser;
//! use semprobe::cli::Args;
//!
//! let args = Args::parse();
//! for report in semprobe::probe::run(&args)? {
//!     println!("{report}");
//! }
//! # Ok::<(), semprobe::ProbeError>(())
//! ```

use crate::cli::{Args, Scenario};
use crate::error::{ProbeError, Result};
use crate::progress::ProbeProgress;
use posix_sem::{Semaphore, TimedWaitError, TryWaitError};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timer overshoot above which the timeout scenario warns
const OVERSHOOT_WARN: Duration = Duration::from_millis(50);

/// How long waiters get to reach the blocking call before the fan-out checks
const SETTLE: Duration = Duration::from_millis(20);

/// Outcome of one scenario whose checks all held
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: &'static str,
    /// Number of individual checks that held
    pub checks: usize,
    /// Wall time spent in the scenario
    pub elapsed: Duration,
    /// Scenario-specific measurement
    pub detail: String,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: ok ({} checks in {:?})",
            self.scenario, self.checks, self.elapsed
        )?;
        if !self.detail.is_empty() {
            write!(f, " {}", self.detail)?;
        }
        Ok(())
    }
}

/// Counts checks for a scenario and turns the first failed one into an error
struct Checker {
    scenario: &'static str,
    checks: usize,
}

impl Checker {
    const fn new(scenario: &'static str) -> Self {
        Self {
            scenario,
            checks: 0,
        }
    }

    fn check(&mut self, holds: bool, detail: impl FnOnce() -> String) -> Result<()> {
        if !holds {
            return Err(ProbeError::violation(self.scenario, detail()));
        }
        self.checks += 1;
        Ok(())
    }

    fn finish(self, start: Instant, detail: String) -> ScenarioReport {
        ScenarioReport {
            scenario: self.scenario,
            checks: self.checks,
            elapsed: start.elapsed(),
            detail,
        }
    }
}

/// Run every scenario selected by `args`, in order
///
/// # Errors
///
/// Returns the first [`ProbeError`] any scenario raises.
pub fn run(args: &Args) -> Result<Vec<ScenarioReport>> {
    let scenarios = args.selected_scenarios();
    let mut progress = ProbeProgress::new(scenarios.len() as u64, args.progress);
    let mut reports = Vec::with_capacity(scenarios.len());

    for scenario in scenarios {
        progress.start(scenario.name());
        debug!("Running {} scenario", scenario.name());

        let report = run_scenario(scenario, args)?;
        info!(
            "{} scenario passed: {} checks in {:?}",
            report.scenario, report.checks, report.elapsed
        );
        reports.push(report);
        progress.update();
    }

    progress.finish();
    Ok(reports)
}

/// Run a single scenario
///
/// # Errors
///
/// Returns [`ProbeError::InvalidConfig`] for [`Scenario::All`] or a
/// configuration the scenario cannot run with, and
/// [`ProbeError::ContractViolation`] if a property does not hold.
pub fn run_scenario(scenario: Scenario, args: &Args) -> Result<ScenarioReport> {
    match scenario {
        Scenario::All => Err(ProbeError::InvalidConfig(
            "'all' is not a single scenario".to_string(),
        )),
        Scenario::Capacity => capacity(args.initial),
        Scenario::Timeout => timeout(Duration::from_millis(args.timeout_ms)),
        Scenario::Fanout => fanout(args.effective_threads()),
        Scenario::PingPong => ping_pong(args.rounds),
        Scenario::Bounded => bounded(args.initial, args.effective_threads(), args.rounds),
    }
}

/// Lock `mutex`, recording a poisoned lock in `poisoned` rather than hiding it
///
/// Workers keep cycling the semaphores after a poisoned lock so that no peer
/// stays blocked; the flag turns the run into an error once they are joined.
fn lock_or_flag<'a, T>(mutex: &'a Mutex<T>, poisoned: &AtomicBool) -> Option<MutexGuard<'a, T>> {
    match mutex.lock() {
        Ok(guard) => Some(guard),
        Err(_) => {
            poisoned.store(true, Ordering::SeqCst);
            None
        }
    }
}

/// Take units with try-wait until it would block
fn drain(sem: &Semaphore) -> u64 {
    let mut taken = 0;
    while sem.try_wait().is_ok() {
        taken += 1;
    }
    taken
}

/// Initial value and signal arithmetic for `0`, `1` and `initial`
///
/// # Errors
///
/// Returns [`ProbeError::ContractViolation`] if a count does not match.
pub fn capacity(initial: u32) -> Result<ScenarioReport> {
    let start = Instant::now();
    let mut checker = Checker::new("capacity");

    let mut values = vec![0, 1, initial];
    values.sort_unstable();
    values.dedup();

    for &v in &values {
        let sem = Semaphore::new(v);
        for i in 0..v {
            checker.check(sem.try_wait().is_ok(), || {
                format!("try-wait #{} on new({v}) would block", i + 1)
            })?;
        }
        checker.check(sem.try_wait() == Err(TryWaitError::WouldBlock), || {
            format!("try-wait #{} on new({v}) did not block", v + 1)
        })?;

        let sem = Semaphore::new(v);
        sem.signal();
        let taken = drain(&sem);
        checker.check(taken == u64::from(v) + 1, || {
            format!("new({v}) + signal yielded {taken} units")
        })?;
        sem.destroy();
    }

    Ok(checker.finish(start, format!("values={values:?}")))
}

/// Timed waits on an empty semaphore, then on an available one
///
/// # Errors
///
/// Returns [`ProbeError::ContractViolation`] if a wait returns the wrong
/// outcome or times out before its bound.
///
/// The elapsed time is measured on the monotonic clock while `sem_timedwait`
/// measures its deadline on `CLOCK_REALTIME`; a wall-clock step forward
/// during the wait ends it early and can make a correct platform fail the
/// bound check.
pub fn timeout(bound: Duration) -> Result<ScenarioReport> {
    let start = Instant::now();
    let mut checker = Checker::new("timeout");
    let sem = Semaphore::new(0);

    let outcome = sem.timed_wait(Duration::ZERO);
    checker.check(outcome == Err(TimedWaitError::TimedOut), || {
        format!("timed-wait(0) on empty semaphore returned {outcome:?}")
    })?;

    let waited = Instant::now();
    let outcome = sem.timed_wait(bound);
    let elapsed = waited.elapsed();
    checker.check(outcome == Err(TimedWaitError::TimedOut), || {
        format!("timed-wait({bound:?}) on empty semaphore returned {outcome:?}")
    })?;
    checker.check(elapsed >= bound, || {
        format!("timed-wait({bound:?}) gave up after only {elapsed:?}")
    })?;

    let overshoot = elapsed.saturating_sub(bound);
    if overshoot > OVERSHOOT_WARN {
        warn!(
            "Timed wait overshot its {:?} bound by {:?}",
            bound, overshoot
        );
    }

    sem.signal();
    let outcome = sem.timed_wait(bound);
    checker.check(outcome.is_ok(), || {
        format!("timed-wait after signal returned {outcome:?}")
    })?;
    checker.check(sem.try_wait() == Err(TryWaitError::WouldBlock), || {
        "unit left over after timed-wait consumed it".to_string()
    })?;

    Ok(checker.finish(start, format!("overshoot={overshoot:?}")))
}

/// `waiters` threads block on an empty semaphore and are released one signal each
///
/// # Errors
///
/// Returns [`ProbeError::ContractViolation`] if a waiter passes before being
/// signalled or the wake count differs from the signal count, and
/// [`ProbeError::ThreadPanicked`] if a worker dies.
pub fn fanout(waiters: usize) -> Result<ScenarioReport> {
    let start = Instant::now();
    let mut checker = Checker::new("fanout");
    let sem = Arc::new(Semaphore::new(0));
    let woken = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..waiters)
        .map(|_| {
            let sem = Arc::clone(&sem);
            let woken = Arc::clone(&woken);
            std::thread::spawn(move || {
                sem.wait();
                woken.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    std::thread::sleep(SETTLE);
    let early = woken.load(Ordering::SeqCst);
    if early != 0 {
        // Release the rest so no detached thread stays blocked after a failing run
        for _ in 0..waiters {
            sem.signal();
        }
    }
    checker.check(early == 0, || {
        format!("{early} waiter(s) woke before any signal")
    })?;

    let signaller = {
        let sem = Arc::clone(&sem);
        std::thread::spawn(move || {
            for _ in 0..waiters {
                sem.signal();
            }
        })
    };

    signaller
        .join()
        .map_err(|_| ProbeError::ThreadPanicked("fanout"))?;
    for handle in handles {
        handle
            .join()
            .map_err(|_| ProbeError::ThreadPanicked("fanout"))?;
    }

    let total = woken.load(Ordering::SeqCst);
    checker.check(total == waiters, || {
        format!("{waiters} signals woke {total} waiters")
    })?;
    checker.check(sem.try_wait() == Err(TryWaitError::WouldBlock), || {
        "units left over after every waiter was released".to_string()
    })?;

    Ok(checker.finish(start, format!("waiters={waiters}")))
}

/// Two threads alternate `rounds` times, each waiting on its own semaphore
/// and signalling the other's
///
/// # Errors
///
/// Returns [`ProbeError::ContractViolation`] if the token is lost or
/// duplicated, and [`ProbeError::ThreadPanicked`] if the partner thread dies.
pub fn ping_pong(rounds: usize) -> Result<ScenarioReport> {
    let start = Instant::now();
    let mut checker = Checker::new("ping-pong");
    let ping = Semaphore::new(0);
    let pong = Semaphore::new(0);
    let returns = AtomicUsize::new(0);

    let round_trips = std::thread::scope(|s| {
        let partner = s.spawn(|| {
            for _ in 0..rounds {
                ping.wait();
                returns.fetch_add(1, Ordering::SeqCst);
                pong.signal();
            }
        });

        let timer = Instant::now();
        for _ in 0..rounds {
            ping.signal();
            pong.wait();
        }
        let spent = timer.elapsed();

        partner
            .join()
            .map_err(|_| ProbeError::ThreadPanicked("ping-pong"))?;
        Ok::<_, ProbeError>(spent)
    })?;

    let seen = returns.load(Ordering::SeqCst);
    checker.check(seen == rounds, || {
        format!("{rounds} pings produced {seen} pongs")
    })?;
    checker.check(
        ping.try_wait() == Err(TryWaitError::WouldBlock)
            && pong.try_wait() == Err(TryWaitError::WouldBlock),
        || "token duplicated: a unit was left over".to_string(),
    )?;

    let mean = round_trips / u32::try_from(rounds.max(1)).unwrap_or(u32::MAX);
    Ok(checker.finish(start, format!("mean_round_trip={mean:?}")))
}

/// `workers` producers and `workers` consumers move `items` values through a
/// buffer with `slots` places
///
/// # Errors
///
/// Returns [`ProbeError::InvalidConfig`] if `slots` or `workers` is zero,
/// [`ProbeError::ContractViolation`] if values are lost, duplicated or the
/// buffer overfills, and [`ProbeError::ThreadPanicked`] if a worker dies.
pub fn bounded(slots: u32, workers: usize, items: usize) -> Result<ScenarioReport> {
    if slots == 0 {
        return Err(ProbeError::InvalidConfig(
            "bounded scenario needs --initial of at least 1".to_string(),
        ));
    }
    if workers == 0 {
        return Err(ProbeError::InvalidConfig(
            "bounded scenario needs at least one worker thread".to_string(),
        ));
    }

    let start = Instant::now();
    let mut checker = Checker::new("bounded");
    let free = Semaphore::new(slots);
    let filled = Semaphore::new(0);
    let buffer = Mutex::new(VecDeque::with_capacity(slots as usize));
    let high_water = AtomicUsize::new(0);
    let consumed_count = AtomicUsize::new(0);
    let consumed_sum = AtomicUsize::new(0);
    let poisoned = AtomicBool::new(false);

    // Split items as evenly as possible; consumers take the same shares
    let share = move |worker: usize| items / workers + usize::from(worker < items % workers);

    std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers * 2);
        for worker in 0..workers {
            let (free, filled, buffer, high_water) = (&free, &filled, &buffer, &high_water);
            let poisoned = &poisoned;
            handles.push(s.spawn(move || {
                for item in (worker..items).step_by(workers) {
                    free.wait();
                    if let Some(mut queue) = lock_or_flag(buffer, poisoned) {
                        queue.push_back(item);
                        high_water.fetch_max(queue.len(), Ordering::SeqCst);
                    }
                    filled.signal();
                }
            }));
        }
        for worker in 0..workers {
            let (free, filled, buffer) = (&free, &filled, &buffer);
            let (consumed_count, consumed_sum) = (&consumed_count, &consumed_sum);
            let poisoned = &poisoned;
            handles.push(s.spawn(move || {
                for _ in 0..share(worker) {
                    filled.wait();
                    let item = lock_or_flag(buffer, poisoned).and_then(|mut queue| queue.pop_front());
                    free.signal();
                    if let Some(item) = item {
                        consumed_sum.fetch_add(item, Ordering::SeqCst);
                        consumed_count.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        handles
            .into_iter()
            .try_for_each(|handle| handle.join().map_err(|_| ProbeError::ThreadPanicked("bounded")))
    })?;

    if poisoned.load(Ordering::SeqCst) {
        return Err(ProbeError::ThreadPanicked("bounded"));
    }

    let count = consumed_count.load(Ordering::SeqCst);
    checker.check(count == items, || {
        format!("{items} items produced, {count} consumed")
    })?;

    let sum = consumed_sum.load(Ordering::SeqCst);
    let expected = items * items.saturating_sub(1) / 2;
    checker.check(sum == expected, || {
        format!("consumed values sum to {sum}, expected {expected}")
    })?;

    let peak = high_water.load(Ordering::SeqCst);
    checker.check(peak <= slots as usize, || {
        format!("buffer held {peak} items with only {slots} slots")
    })?;

    let returned = drain(&free);
    checker.check(returned == u64::from(slots), || {
        format!("{returned} of {slots} slots returned")
    })?;
    checker.check(filled.try_wait() == Err(TryWaitError::WouldBlock), || {
        "filled count left over after all items were consumed".to_string()
    })?;

    Ok(checker.finish(
        start,
        format!("slots={slots} workers={workers} items={items} peak={peak}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_passes() {
        let report = capacity(3).unwrap();
        assert_eq!(report.scenario, "capacity");
        // values [0, 1, 3]: v+1 try-waits and one signal check each
        assert_eq!(report.checks, (1 + 1) + (2 + 1) + (4 + 1));
    }

    #[test]
    fn test_capacity_dedups_values() {
        let report = capacity(1).unwrap();
        assert_eq!(report.detail, "values=[0, 1]");
    }

    #[test]
    fn test_timeout_passes() {
        let report = timeout(Duration::from_millis(2)).unwrap();
        assert_eq!(report.checks, 5);
        assert!(report.elapsed >= Duration::from_millis(2));
    }

    #[test]
    fn test_fanout_passes() {
        let report = fanout(4).unwrap();
        assert_eq!(report.checks, 3);
    }

    #[test]
    fn test_ping_pong_passes() {
        let report = ping_pong(100).unwrap();
        assert_eq!(report.checks, 2);
        assert!(report.detail.starts_with("mean_round_trip="));
    }

    #[test]
    fn test_bounded_uneven_split() {
        let report = bounded(2, 3, 10).unwrap();
        assert_eq!(report.checks, 5);
    }

    #[test]
    fn test_lock_or_flag_reports_poisoned_lock() {
        let buffer = Mutex::new(VecDeque::<usize>::new());
        let poisoned = AtomicBool::new(false);

        assert!(lock_or_flag(&buffer, &poisoned).is_some());
        assert!(!poisoned.load(Ordering::SeqCst));

        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = buffer.lock().unwrap();
                    panic!("worker died holding the buffer");
                })
                .join();
        });

        assert!(lock_or_flag(&buffer, &poisoned).is_none());
        assert!(poisoned.load(Ordering::SeqCst));
    }

    #[test]
    fn test_bounded_rejects_zero_slots() {
        assert!(matches!(
            bounded(0, 2, 10),
            Err(ProbeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_checker_reports_first_failure() {
        let mut checker = Checker::new("capacity");
        checker.check(true, String::new).unwrap();
        let err = checker
            .check(false, || "boom".to_string())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Contract violation in capacity scenario: boom"
        );
        assert_eq!(checker.checks, 1);
    }

    #[test]
    fn test_report_display() {
        let report = ScenarioReport {
            scenario: "fanout",
            checks: 3,
            elapsed: Duration::from_millis(5),
            detail: "waiters=2".to_string(),
        };
        assert_eq!(report.to_string(), "fanout: ok (3 checks in 5ms) waiters=2");
    }
}
