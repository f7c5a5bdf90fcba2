//! Progress tracking and reporting

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar advancing once per finished scenario
///
/// Hidden unless `--progress` was given, so callers can update it unconditionally.
pub struct ProbeProgress {
    progress_bar: ProgressBar,
    completed: u64,
}

impl ProbeProgress {
    #[must_use]
    pub fn new(total_scenarios: u64, visible: bool) -> Self {
        let pb = if visible {
            ProgressBar::new(total_scenarios)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        Self {
            progress_bar: pb,
            completed: 0,
        }
    }

    /// Announce the scenario about to run
    pub fn start(&self, scenario: &'static str) {
        self.progress_bar.set_message(scenario);
    }

    /// Mark the current scenario as finished
    pub fn update(&mut self) {
        self.completed += 1;
        self.progress_bar.inc(1);
    }

    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    pub fn finish(&self) {
        self.progress_bar.finish_with_message("Probe completed");
    }
}
