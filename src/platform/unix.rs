//! Unix process termination (Linux, macOS and other Unix-likes)

use std::io;

use tracing::debug;

use super::Termination;

/// Terminate a process gracefully (SIGTERM)
pub fn terminate_process(pid: u32) -> io::Result<Termination> {
    // pid 0 and negative values address process groups, never a single process
    let raw = libc::pid_t::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid))
        })?;

    let result = unsafe { libc::kill(raw, libc::SIGTERM) };
    if result == 0 {
        debug!("Sent SIGTERM to PID {}", pid);
        return Ok(Termination::Requested);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(Termination::AlreadyExited)
    } else {
        Err(err)
    }
}
