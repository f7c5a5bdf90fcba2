//! semprobe: Conformance probe for native POSIX counting semaphores
//!
//! This library runs the counting-semaphore properties (capacity, timeouts,
//! fan-out wake-ups, hand-off and bounded-buffer use) against the host's
//! native semaphore facility through the [`posix_sem`] wrapper, and reports
//! which of them hold.

pub mod cli;
pub mod error;
pub mod probe;
pub mod progress;

// Re-export commonly used types
pub use error::{ProbeError, Result};
pub use probe::ScenarioReport;
pub use progress::ProbeProgress;
