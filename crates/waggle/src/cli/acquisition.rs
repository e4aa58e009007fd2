//! Recorder lifecycle commands: start, stop, status, finalize.

use anyhow::{Context, Result};
use std::path::Path;
use waggle_acquisition::{AcquisitionError, PollStatus, Supervisor, SweepReport};
use waggle_config::AcquisitionConfig;

fn load_config(config_path: &Path) -> Result<AcquisitionConfig> {
    waggle_config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

fn supervisor() -> Supervisor {
    Supervisor::new(
        waggle_logging::waggle_home().join("acquisition.lock"),
        waggle_logging::recorder_log_dir(),
    )
}

fn print_sweep(sweep: &SweepReport) {
    println!(
        "Finalized {} segment(s) ({} stale, {} incomplete)",
        sweep.finalized.len(),
        sweep.skipped_stale,
        sweep.skipped_incomplete
    );
    for segment in &sweep.finalized {
        println!("  {}", segment.canonical_base);
    }
    for (sidecar, error) in &sweep.errors {
        println!("  ERROR {}: {}", sidecar.display(), error);
    }
}

pub fn run_start(config_path: &Path, recorder: &Path) -> Result<()> {
    let _ = load_config(config_path)?; // fail early on a broken config

    let mut supervisor = supervisor();
    match supervisor.start(recorder) {
        Ok(pid) => {
            println!("Recorder started (pid {pid})");
            Ok(())
        }
        Err(AcquisitionError::AlreadyRunning { pid }) => {
            println!("Recorder is already running (pid {pid})");
            Ok(())
        }
        Err(err) => Err(err).context("Failed to start recorder"),
    }
}

pub fn run_stop(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let mut supervisor = supervisor();
    match supervisor.stop(&config) {
        Ok(outcome) => {
            println!("Recorder stopped (pid {})", outcome.pid);
            print_sweep(&outcome.sweep);
            Ok(())
        }
        Err(AcquisitionError::NotRunning) => {
            println!("No recorder is running");
            Ok(())
        }
        Err(err) => Err(err).context("Failed to stop recorder"),
    }
}

pub fn run_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let mut supervisor = supervisor();
    match supervisor.poll(&config)? {
        PollStatus::Running { pid } => println!("Status: running (pid {pid})"),
        PollStatus::Crashed => {
            println!("Status: recorder exited unexpectedly; staged segments were finalized")
        }
        PollStatus::Idle => println!("Status: idle"),
    }
    Ok(())
}

pub fn run_finalize(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let mut supervisor = supervisor();
    let sweep = supervisor.finalize(&config)?;
    print_sweep(&sweep);
    Ok(())
}
