//! Common test helpers for integration tests

use semprobe::cli::{Args, Scenario};

/// Create a small, fast Args for testing
pub fn create_test_args(scenario: Scenario) -> Args {
    Args {
        scenario,
        threads: 2,
        initial: 3,
        rounds: 50,
        timeout_ms: 2,
        progress: false,
        verbose: 0,
        quiet: false,
    }
}
