//! Process launching - Building and spawning browser command lines

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::info;

use super::profile::Profile;
use super::settings::Settings;
use crate::platform::{OsFamily, Platform};

/// Command-line flag carrying the isolation directory
pub const USER_DATA_DIR_FLAG: &str = "--user-data-dir";

/// Always appended so a fresh profile opens without interactive prompts
pub const SUPPRESSION_FLAGS: [&str; 2] = ["--no-first-run", "--no-default-browser-check"];

/// The application being supervised and how to recognise its processes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Executable to spawn
    pub executable: PathBuf,
    /// Arguments placed before the isolation flag
    pub leading_args: Vec<String>,
    /// Arguments placed after the suppression flags
    pub extra_args: Vec<String>,
    /// File names that identify a running instance in a process listing
    pub process_names: Vec<String>,
}

impl LaunchTarget {
    /// Google Chrome at its usual install location
    pub fn for_platform(family: OsFamily) -> Self {
        let (executable, names): (&str, &[&str]) = match family {
            OsFamily::MacOs => (
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                &["Google Chrome"],
            ),
            OsFamily::Windows => (
                "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
                &["chrome.exe"],
            ),
            OsFamily::Linux => (
                "google-chrome",
                &["google-chrome", "google-chrome-stable", "chrome"],
            ),
            OsFamily::Other => ("chrome", &["chrome"]),
        };

        Self {
            executable: PathBuf::from(executable),
            leading_args: Vec::new(),
            extra_args: Vec::new(),
            process_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Platform default, adjusted by the user's settings
    pub fn from_settings(family: OsFamily, settings: &Settings) -> Self {
        let mut target = Self::for_platform(family);
        if let Some(executable) = &settings.executable {
            target = Self::custom(executable.clone());
        }
        target.extra_args = settings.extra_args.clone();
        target
    }

    /// Arbitrary executable, recognised by its own file name
    pub fn custom(executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        let process_names = executable
            .file_name()
            .map(|name| vec![name.to_string_lossy().into_owned()])
            .unwrap_or_default();
        Self {
            executable,
            leading_args: Vec::new(),
            extra_args: Vec::new(),
            process_names,
        }
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }
}

/// Fully resolved program and arguments for one profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Build the launch command for `profile`.
///
/// The isolation flag is omitted for the default profile; otherwise it
/// carries the absolute directory with the platform's separators.
pub fn build_launch_command(
    platform: &Platform,
    target: &LaunchTarget,
    profile: &Profile,
) -> LaunchCommand {
    let mut args = target.leading_args.clone();

    if let Some(dir) = profile.isolation_dir() {
        args.push(format!(
            "{}={}",
            USER_DATA_DIR_FLAG,
            platform.normalized_display(dir)
        ));
    }

    args.extend(SUPPRESSION_FLAGS.iter().map(|flag| flag.to_string()));
    args.extend(target.extra_args.iter().cloned());

    LaunchCommand {
        program: target.executable.clone(),
        args,
    }
}

/// Spawn the command detached from our session with null stdio.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_detached(command: &LaunchCommand) -> std::io::Result<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);

    // Detach from our process group
    #[cfg(windows)]
    {
        cmd.creation_flags(0x00000008); // DETACHED_PROCESS
    }

    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    let child = cmd.spawn()?;
    info!(
        "Spawned {:?} with PID {}",
        command.program,
        child.id().unwrap_or_default()
    );
    Ok(child)
}
