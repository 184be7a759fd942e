//! Windows process termination

use std::io;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, ERROR_INVALID_PARAMETER, FALSE};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_TERMINATE,
};

/// Exit code reported for a process that has not exited yet
const STILL_ACTIVE: u32 = 259;

/// Terminate a process. Windows has no SIGTERM equivalent for arbitrary
/// processes, so this is the closest request the OS offers.
pub fn terminate_process(pid: u32) -> io::Result<super::Termination> {
    unsafe {
        let handle = match OpenProcess(
            PROCESS_TERMINATE | PROCESS_QUERY_LIMITED_INFORMATION,
            FALSE,
            pid,
        ) {
            Ok(handle) => handle,
            Err(e) if e.code() == ERROR_INVALID_PARAMETER.to_hresult() => {
                return Ok(super::Termination::AlreadyExited)
            }
            Err(e) => return Err(io::Error::other(e)),
        };

        let mut exit_code: u32 = 0;
        if GetExitCodeProcess(handle, &mut exit_code).is_ok() && exit_code != STILL_ACTIVE {
            let _ = CloseHandle(handle);
            return Ok(super::Termination::AlreadyExited);
        }

        let result = TerminateProcess(handle, 1);
        let _ = CloseHandle(handle);

        result.map_err(io::Error::other)?;
        debug!("Terminated PID {}", pid);
        Ok(super::Termination::Requested)
    }
}
