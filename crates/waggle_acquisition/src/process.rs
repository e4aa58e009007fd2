//! Pid liveness checks and signal delivery for the supervised recorder.
//!
//! The recorder is an independent OS process; after a controller restart the
//! only handle we have is the pid from the lockfile, so both liveness and
//! termination go through raw signals rather than a `Child` handle.

/// Check whether a process with the given pid exists.
///
/// Uses `kill(pid, 0)`: no signal is delivered, only the existence check is
/// performed. `EPERM` means the process exists but belongs to another user.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

/// Request graceful termination (SIGTERM).
///
/// Returns `Ok(())` when the process was already gone (`ESRCH`): the goal is
/// "not running", and a pid that vanished between lockfile read and signal
/// delivery has reached it.
#[cfg(unix)]
pub fn terminate(pid: u32) -> std::io::Result<()> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::other(
        "signal-based termination is only supported on Unix",
    ))
}
