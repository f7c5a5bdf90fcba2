//! semprobe: Conformance probe for native POSIX counting semaphores
//!
//! Runs the selected semaphore scenarios against the host platform and prints
//! one line per scenario. Exits non-zero on the first property that does not hold.

use anyhow::{Context, Result};
use clap::Parser;
use semprobe::cli::Args;
use semprobe::probe;
use tracing::{info, Level};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    if !args.quiet {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match args.verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // In quiet mode, only log errors
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    }

    // Validate arguments
    args.validate().context("Invalid arguments")?;

    info!("Starting semprobe v{}", env!("CARGO_PKG_VERSION"));
    info!("Scenario: {}", args.scenario.name());
    info!("Threads: {}", args.effective_threads());
    info!("Initial value: {}", args.initial);
    info!("Rounds: {}", args.rounds);
    info!("Timeout: {} ms", args.timeout_ms);

    match probe::run(&args) {
        Ok(reports) => {
            if !args.quiet {
                for report in &reports {
                    println!("{report}");
                }
            }
            info!("All {} scenario(s) passed", reports.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
