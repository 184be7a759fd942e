//! Process discovery - Finding browser processes by their isolation directory
//!
//! Instances may have been started before the supervisor or by someone else,
//! so they are recognised from command lines rather than from owned handles.
//! Per-OS conventions live in [`CommandLineRules`]; enumeration and
//! termination live behind the [`ProcessMatcher`] trait.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, info, warn};

use super::process::{LaunchTarget, USER_DATA_DIR_FLAG};
use crate::platform::{self, OsFamily, Platform, Termination};

/// OS-specific process discovery and termination.
///
/// Both methods may block for the duration of an OS query.
pub trait ProcessMatcher: Send + Sync {
    /// PIDs (ascending) of target processes using `isolation_dir`.
    ///
    /// `None` selects processes started without any isolation directory.
    /// Failure to query the OS is reported as "nothing found".
    fn find(&self, isolation_dir: Option<&Path>) -> Vec<u32>;

    /// Ask one process to terminate gracefully
    fn kill(&self, pid: u32) -> io::Result<Termination>;
}

/// Per-OS rules for recognising a target process from its command line
#[derive(Debug, Clone)]
pub struct CommandLineRules {
    platform: Platform,
    process_names: Vec<String>,
}

impl CommandLineRules {
    pub fn new(platform: &Platform, target: &LaunchTarget) -> Self {
        Self {
            platform: platform.clone(),
            process_names: target.process_names.clone(),
        }
    }

    /// Whether `program` (a path or bare file name) names the target executable
    pub fn is_target_executable(&self, program: &str) -> bool {
        let file_name = program
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(program)
            .trim();
        if file_name.is_empty() {
            return false;
        }

        self.process_names.iter().any(|name| match self.platform.family {
            OsFamily::Windows => strip_exe(file_name).eq_ignore_ascii_case(strip_exe(name)),
            OsFamily::MacOs => file_name.eq_ignore_ascii_case(name),
            OsFamily::Linux | OsFamily::Other => file_name == name,
        })
    }

    /// Whether a process with `cmdline` (argv) and optional image path belongs
    /// to the instance for `isolation_dir`.
    pub fn matches(&self, cmdline: &[String], image: Option<&str>, isolation_dir: Option<&Path>) -> bool {
        // Retitled processes (Linux setproctitle) report their whole command
        // line as a single space-joined argument
        let split;
        let cmdline = match cmdline {
            [joined] if joined.contains(" --") => {
                split = joined.split_whitespace().map(str::to_string).collect::<Vec<_>>();
                &split[..]
            }
            _ => cmdline,
        };

        let argv0_matches = cmdline
            .first()
            .is_some_and(|argv0| self.is_target_executable(argv0));
        let image_matches = image.is_some_and(|image| self.is_target_executable(image));
        if !(argv0_matches || image_matches) {
            return false;
        }

        // Renderer/GPU/utility children share the directory and exit with the browser
        if cmdline.iter().any(|arg| arg.starts_with("--type=")) {
            return false;
        }

        match (isolation_dir, isolation_argument(cmdline)) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(_), None) => false,
            (Some(wanted), Some(found)) => self.same_isolation_dir(wanted, Path::new(found)),
        }
    }

    fn same_isolation_dir(&self, wanted: &Path, found: &Path) -> bool {
        let wanted = self.platform.normalized_display(wanted);
        let found = self.platform.normalized_display(found);
        if self.platform.family.case_insensitive_paths() {
            wanted.eq_ignore_ascii_case(&found)
        } else {
            wanted == found
        }
    }
}

fn strip_exe(name: &str) -> &str {
    let split = name.len().saturating_sub(4);
    match name.get(split..) {
        Some(ext) if split > 0 && ext.eq_ignore_ascii_case(".exe") => &name[..split],
        _ => name,
    }
}

/// Value of the isolation flag, in either `--flag=value` or `--flag value` form
fn isolation_argument(cmdline: &[String]) -> Option<&str> {
    let prefix = format!("{}=", USER_DATA_DIR_FLAG);
    let mut args = cmdline.iter().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.trim_matches('"'));
        }
        if arg == USER_DATA_DIR_FLAG {
            return args.next().map(|value| value.trim_matches('"'));
        }
    }
    None
}

/// Discovers processes through the OS process table via `sysinfo`
pub struct SystemProcessMatcher {
    rules: CommandLineRules,
    system: Mutex<System>,
}

impl SystemProcessMatcher {
    pub fn new(rules: CommandLineRules) -> Self {
        Self {
            rules,
            system: Mutex::new(System::new()),
        }
    }
}

impl ProcessMatcher for SystemProcessMatcher {
    fn find(&self, isolation_dir: Option<&Path>) -> Vec<u32> {
        let mut system = match self.system.lock() {
            Ok(system) => system,
            Err(e) => {
                warn!("Process table lock poisoned: {}", e);
                return Vec::new();
            }
        };

        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::Always)
                .with_exe(UpdateKind::OnlyIfNotSet),
        );

        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| {
                let cmdline: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                let image = process
                    .exe()
                    .map(|exe| exe.to_string_lossy().into_owned())
                    .unwrap_or_else(|| process.name().to_string_lossy().into_owned());
                // An empty command line means we were not allowed to read it
                !cmdline.is_empty() && self.rules.matches(&cmdline, Some(&image), isolation_dir)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();

        debug!(
            "Found {} process(es) for {:?}: {:?}",
            pids.len(),
            isolation_dir,
            pids
        );
        pids
    }

    fn kill(&self, pid: u32) -> io::Result<Termination> {
        let outcome = platform::terminate_process(pid)?;
        match outcome {
            Termination::Requested => info!("Requested termination of PID {}", pid),
            Termination::AlreadyExited => {
                info!("PID {} exited before it could be terminated", pid)
            }
        }
        Ok(outcome)
    }
}

/// Used where the OS cannot be queried: nothing is ever found
pub struct UnsupportedMatcher;

impl ProcessMatcher for UnsupportedMatcher {
    fn find(&self, isolation_dir: Option<&Path>) -> Vec<u32> {
        debug!(
            "Process discovery unsupported; treating {:?} as not running",
            isolation_dir
        );
        Vec::new()
    }

    fn kill(&self, pid: u32) -> io::Result<Termination> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot terminate PID {} on this platform", pid),
        ))
    }
}

/// Pick the matcher variant for `platform`
pub fn matcher_for(platform: &Platform, target: &LaunchTarget) -> Arc<dyn ProcessMatcher> {
    match platform.family {
        OsFamily::Other => Arc::new(UnsupportedMatcher),
        _ => Arc::new(SystemProcessMatcher::new(CommandLineRules::new(
            platform, target,
        ))),
    }
}
