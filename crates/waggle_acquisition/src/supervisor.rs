//! Single-instance supervisor for the external recorder process.
//!
//! The recorder is an independent OS process; the supervisor and the
//! recorder communicate only through the lockfile and the filesystem. The
//! supervisor survives controller restarts: on the next `poll` it
//! re-discovers a still-running recorder from the lockfile pid, and treats a
//! dead pid as a crash (finalize + clear), never leaving a stale lock behind.
//!
//! State machine: `Idle -> Running` on start, `-> Idle` on stop or crash via
//! finalize. `start` while running is an error, not a restart.

use crate::error::{AcquisitionError, Result};
use crate::finalizer::{self, SweepReport};
use crate::lockfile::{LockFile, LockStatus};
use crate::process;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Grace period `stop` waits for the recorder to exit after SIGTERM.
const STOP_GRACE: Duration = Duration::from_secs(5);
/// Poll interval while waiting out the grace period.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Supervisor view of the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running { pid: u32 },
}

/// Result of a `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Idle,
    Running { pid: u32 },
    /// The lock said running but the pid is dead; finalize has already run.
    Crashed,
}

/// Result of a successful `stop`.
#[derive(Debug)]
pub struct StopOutcome {
    pub pid: u32,
    pub sweep: SweepReport,
}

pub struct Supervisor {
    lockfile: LockFile,
    /// Where recorder stdout/stderr capture files go (diagnostics only; no
    /// control decisions are read from the streams).
    capture_dir: PathBuf,
    state: SupervisorState,
    /// Present only for a recorder spawned by this controller instance;
    /// after a restart we hold just the pid. Kept so exited children are
    /// reaped before liveness checks.
    child: Option<Child>,
    grace: Duration,
}

impl Supervisor {
    pub fn new(lockfile_path: impl Into<PathBuf>, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            lockfile: LockFile::new(lockfile_path),
            capture_dir: capture_dir.into(),
            state: SupervisorState::Idle,
            child: None,
            grace: STOP_GRACE,
        }
    }

    /// Override the stop grace period (tests).
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn lockfile(&self) -> &LockFile {
        &self.lockfile
    }

    /// Start the recorder. Errors with `AlreadyRunning` when a live lock
    /// exists (or another controller wins the exclusive create).
    ///
    /// The lock identity is reserved *before* the spawn and the pid is
    /// committed after it; on a failed commit the just-spawned process is
    /// terminated so it can never outlive its lock.
    pub fn start(&mut self, command_path: &Path) -> Result<u32> {
        if let Some(pid) = self.lockfile.read_live()? {
            self.state = SupervisorState::Running { pid };
            return Err(AcquisitionError::AlreadyRunning { pid });
        }

        let reservation = match self.lockfile.acquire() {
            Ok(reservation) => reservation,
            Err(AcquisitionError::Lock { path, source })
                if source.kind() == std::io::ErrorKind::AlreadyExists =>
            {
                let pid = LockFile::new(path).read_live()?.unwrap_or(0);
                return Err(AcquisitionError::AlreadyRunning { pid });
            }
            Err(err) => return Err(err),
        };

        let child = self.spawn_recorder(command_path)?;
        let pid = child.id();

        if let Err(err) = reservation.commit(pid) {
            // Without a committed lock the recorder would be unsupervised;
            // roll the spawn back.
            warn!(
                "Lockfile commit failed after spawning pid {}; terminating recorder",
                pid
            );
            if let Err(kill_err) = process::terminate(pid) {
                warn!("Rollback termination of pid {} failed: {}", pid, kill_err);
            }
            return Err(err);
        }

        info!(
            "Started recorder {} (pid {})",
            command_path.display(),
            pid
        );
        self.child = Some(child);
        self.state = SupervisorState::Running { pid };
        Ok(pid)
    }

    fn spawn_recorder(&self, command_path: &Path) -> Result<Child> {
        let spawn_err = |source| AcquisitionError::Spawn {
            command: command_path.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(&self.capture_dir).map_err(spawn_err)?;
        let stdout = File::create(self.capture_dir.join("recorder.stdout.log")).map_err(spawn_err)?;
        let stderr = File::create(self.capture_dir.join("recorder.stderr.log")).map_err(spawn_err)?;

        Command::new(command_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(spawn_err)
    }

    /// Stop the recorder: SIGTERM, wait out the grace period, then finalize.
    ///
    /// Finalize runs even when the signal fails or the wait times out —
    /// partial state must not block resource cleanup. A timeout is surfaced
    /// as an error after cleanup; the process is never force-killed.
    pub fn stop(&mut self, config: &waggle_config::AcquisitionConfig) -> Result<StopOutcome> {
        let Some(pid) = self.lockfile.read_live()? else {
            return Err(AcquisitionError::NotRunning);
        };

        let termination = process::terminate(pid)
            .map_err(|source| AcquisitionError::Signal { pid, source })
            .and_then(|()| self.wait_for_exit(pid));

        let sweep = self.finalize(config)?;

        match termination {
            Ok(()) => {
                info!("Recorder (pid {}) stopped", pid);
                Ok(StopOutcome { pid, sweep })
            }
            Err(err) => {
                warn!("Recorder (pid {}) did not stop cleanly: {}", pid, err);
                Err(err)
            }
        }
    }

    fn wait_for_exit(&mut self, pid: u32) -> Result<()> {
        let deadline = Instant::now() + self.grace;
        loop {
            self.reap_child();
            if !process::process_alive(pid) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AcquisitionError::StopTimeout {
                    pid,
                    grace: self.grace,
                });
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
    }

    /// Collect an exited child so its pid stops reading as alive.
    fn reap_child(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("Recorder exited with {}", status);
                    self.child = None;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Failed to check recorder exit status: {}", err);
                    self.child = None;
                }
            }
        }
    }

    /// Check recorder liveness and reconcile state.
    ///
    /// A lockfile whose pid is dead is a crash: it is handled exactly like a
    /// clean stop (finalize, clear lock). Recovery is idempotent — the poll
    /// after a `Crashed` result reports `Idle`.
    pub fn poll(&mut self, config: &waggle_config::AcquisitionConfig) -> Result<PollStatus> {
        self.reap_child();

        match self.lockfile.status()? {
            LockStatus::Live(pid) => {
                self.state = SupervisorState::Running { pid };
                Ok(PollStatus::Running { pid })
            }
            LockStatus::Stale => {
                warn!("Recorder died without a stop; recovering");
                self.finalize(config)?;
                Ok(PollStatus::Crashed)
            }
            LockStatus::Absent => {
                if self.state != SupervisorState::Idle {
                    // We believed a recorder was running but its lock is
                    // gone; sweep whatever it left behind.
                    warn!("Lockfile vanished while running; recovering");
                    self.finalize(config)?;
                    return Ok(PollStatus::Crashed);
                }
                Ok(PollStatus::Idle)
            }
        }
    }

    /// Sweep the staging directory for the primary camera, clear the
    /// lockfile, and return to `Idle`.
    pub fn finalize(&mut self, config: &waggle_config::AcquisitionConfig) -> Result<SweepReport> {
        let (camera, stream) = config.primary_stream()?;
        let report = finalizer::sweep(
            &config.tmp_dir,
            &config.out_dir,
            camera,
            stream.frames_per_file,
            stream.frames_per_second,
        )?;

        self.lockfile.remove()?;
        self.child = None;
        self.state = SupervisorState::Idle;
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};
    use waggle_config::AcquisitionConfig;

    struct Harness {
        _dir: TempDir,
        supervisor: Supervisor,
        config: AcquisitionConfig,
        root: PathBuf,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let mut config = AcquisitionConfig::default();
        config.tmp_dir = root.join("tmp");
        config.out_dir = root.join("out");

        let supervisor = Supervisor::new(root.join("acquisition.lock"), root.join("capture"));
        Harness {
            _dir: dir,
            supervisor,
            config,
            root,
        }
    }

    /// Stand-in recorder: a shell script so tests control its lifetime.
    fn fake_recorder(root: &Path, body: &str) -> PathBuf {
        let path = root.join("recorder.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn start_then_stop_roundtrip() {
        let mut h = harness();
        let recorder = fake_recorder(&h.root, "exec sleep 30");

        let pid = h.supervisor.start(&recorder).unwrap();
        assert!(process::process_alive(pid));
        assert_eq!(h.supervisor.state(), SupervisorState::Running { pid });

        let outcome = h.supervisor.stop(&h.config).unwrap();
        assert_eq!(outcome.pid, pid);
        assert_eq!(h.supervisor.state(), SupervisorState::Idle);
        assert_eq!(h.supervisor.lockfile().status().unwrap(), LockStatus::Absent);
    }

    #[test]
    fn second_start_reports_already_running() {
        let mut h = harness();
        let recorder = fake_recorder(&h.root, "exec sleep 30");

        let pid = h.supervisor.start(&recorder).unwrap();
        match h.supervisor.start(&recorder) {
            Err(AcquisitionError::AlreadyRunning { pid: seen }) => assert_eq!(seen, pid),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        h.supervisor.stop(&h.config).unwrap();
    }

    #[test]
    fn stop_without_start_is_not_running() {
        let mut h = harness();
        let config = h.config.clone();
        assert!(matches!(
            h.supervisor.stop(&config),
            Err(AcquisitionError::NotRunning)
        ));
    }

    #[test]
    fn crash_is_detected_and_recovery_is_idempotent() {
        let mut h = harness();
        let recorder = fake_recorder(&h.root, "exec sleep 0.1");

        h.supervisor.start(&recorder).unwrap();
        std::thread::sleep(Duration::from_millis(400));

        let config = h.config.clone();
        assert_eq!(h.supervisor.poll(&config).unwrap(), PollStatus::Crashed);
        assert_eq!(h.supervisor.lockfile().status().unwrap(), LockStatus::Absent);
        assert_eq!(h.supervisor.poll(&config).unwrap(), PollStatus::Idle);
    }

    #[test]
    fn crash_recovery_sweeps_staging() {
        let mut h = harness();
        let staging = h.config.tmp_dir.join("cam-0");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("seg.mp4"), b"video").unwrap();
        fs::write(
            staging.join("seg.txt"),
            "cam-0_2025-01-22T13:36:01.562Z\ncam-0_2025-01-22T13:36:11.395Z",
        )
        .unwrap();

        let recorder = fake_recorder(&h.root, "exec sleep 0.1");
        h.supervisor.start(&recorder).unwrap();
        std::thread::sleep(Duration::from_millis(400));

        let config = h.config.clone();
        assert_eq!(h.supervisor.poll(&config).unwrap(), PollStatus::Crashed);

        let base = "cam-0_2025-01-22T13:36:01.562Z--2025-01-22T13:36:11.395Z";
        assert!(config.out_dir.join("cam-0").join(format!("{base}.mp4")).exists());
    }

    #[test]
    fn stop_timeout_still_finalizes_and_surfaces_error() {
        let mut h = harness();
        // Ignores SIGTERM; only SIGKILL (sent below as cleanup) ends it.
        let recorder = fake_recorder(&h.root, "trap '' TERM\nwhile :; do sleep 0.1; done");

        h.supervisor = Supervisor::new(
            h.root.join("acquisition.lock"),
            h.root.join("capture"),
        )
        .with_grace(Duration::from_millis(300));

        let pid = h.supervisor.start(&recorder).unwrap();
        let config = h.config.clone();

        match h.supervisor.stop(&config) {
            Err(AcquisitionError::StopTimeout { pid: seen, .. }) => assert_eq!(seen, pid),
            other => panic!("expected StopTimeout, got {other:?}"),
        }
        // finalize ran despite the timeout
        assert_eq!(h.supervisor.lockfile().status().unwrap(), LockStatus::Absent);
        assert_eq!(h.supervisor.state(), SupervisorState::Idle);

        unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    }

    #[test]
    fn stale_lock_from_previous_controller_is_recovered() {
        let mut h = harness();
        fs::write(h.root.join("acquisition.lock"), "999999999").unwrap();

        let config = h.config.clone();
        assert_eq!(h.supervisor.poll(&config).unwrap(), PollStatus::Crashed);
        assert_eq!(h.supervisor.poll(&config).unwrap(), PollStatus::Idle);
    }

    #[test]
    fn start_recovers_from_stale_lock() {
        let mut h = harness();
        fs::write(h.root.join("acquisition.lock"), "999999999").unwrap();

        let recorder = fake_recorder(&h.root, "exec sleep 30");
        let pid = h.supervisor.start(&recorder).unwrap();
        assert!(process::process_alive(pid));
        h.supervisor.stop(&h.config).unwrap();
    }
}
