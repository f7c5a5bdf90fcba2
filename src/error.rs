//! Error handling and types

use thiserror::Error;

/// Probe failures
#[derive(Error, Debug)]
pub enum ProbeError {
    /// A semaphore property did not hold on this platform
    #[error("Contract violation in {scenario} scenario: {detail}")]
    ContractViolation {
        /// Scenario that observed the violation
        scenario: &'static str,
        /// What was expected and what happened instead
        detail: String,
    },

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread panicked before reporting
    #[error("Worker thread panicked in {0} scenario")]
    ThreadPanicked(&'static str),
}

impl ProbeError {
    /// Shorthand for a [`ProbeError::ContractViolation`]
    pub fn violation(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self::ContractViolation {
            scenario,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
