//! Command-line interface definitions

use anyhow::Result;
use clap::Parser;

/// Conformance probe for native POSIX counting semaphores
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Which property group to probe
    #[arg(long, value_enum, default_value = "all")]
    pub scenario: Scenario,

    /// Waiter/worker threads for the fan-out and bounded scenarios (0 = auto-detect)
    #[arg(long, default_value = "0")]
    pub threads: usize,

    /// Initial semaphore value for the capacity scenario and the bounded-buffer slot count
    #[arg(long, default_value = "4")]
    pub initial: u32,

    /// Ping-pong round trips and bounded-buffer items
    #[arg(long, default_value = "1000")]
    pub rounds: usize,

    /// Bound for the timed wait probed by the timeout scenario, in milliseconds
    #[arg(long, default_value = "10")]
    pub timeout_ms: u64,

    /// Show progress information
    #[arg(long)]
    pub progress: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Property groups the probe can exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Run every scenario in order
    All,
    /// Initial value and signal arithmetic, observed with try-wait
    Capacity,
    /// Zero and bounded timed waits on an empty semaphore
    Timeout,
    /// N blocked waiters released by N signals
    Fanout,
    /// Two threads handing a token back and forth
    PingPong,
    /// Producers and consumers over a semaphore-bounded buffer
    Bounded,
}

impl Scenario {
    /// Every concrete scenario, in execution order
    pub const ALL: [Self; 5] = [
        Self::Capacity,
        Self::Timeout,
        Self::Fanout,
        Self::PingPong,
        Self::Bounded,
    ];

    /// Stable lowercase name used in reports
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Capacity => "capacity",
            Self::Timeout => "timeout",
            Self::Fanout => "fanout",
            Self::PingPong => "ping-pong",
            Self::Bounded => "bounded",
        }
    }
}

impl Args {
    /// Scenarios selected by `--scenario`, expanded
    #[must_use]
    pub fn selected_scenarios(&self) -> Vec<Scenario> {
        match self.scenario {
            Scenario::All => Scenario::ALL.to_vec(),
            one => vec![one],
        }
    }

    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - Thread count is above 1024, or auto-detection found no CPU cores
    /// - Rounds are outside valid bounds (1-1000000)
    /// - Initial value is above 1000000
    /// - Timeout is above 60000 ms
    /// - Both --quiet and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        if self.threads > 1024 {
            anyhow::bail!("Threads must be at most 1024, got: {}", self.threads);
        }

        if self.effective_threads() == 0 {
            anyhow::bail!("No CPU cores available");
        }

        if self.rounds < 1 || self.rounds > 1_000_000 {
            anyhow::bail!(
                "Rounds must be between 1 and 1000000, got: {}",
                self.rounds
            );
        }

        if self.initial > 1_000_000 {
            anyhow::bail!(
                "Initial value must be at most 1000000, got: {}",
                self.initial
            );
        }

        if self.timeout_ms > 60_000 {
            anyhow::bail!(
                "Timeout must be at most 60000 ms, got: {}",
                self.timeout_ms
            );
        }

        // Validate conflicting options
        if self.quiet && self.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        Ok(())
    }

    /// Get the actual thread count to use
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}
