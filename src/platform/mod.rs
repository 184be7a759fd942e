//! Platform descriptor and platform-specific process termination

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub mod unix;

use std::path::{Component, Path, PathBuf};

/// Operating system family the supervisor is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Other => "other",
        }
    }

    /// Whether the native file system treats paths case-insensitively
    pub fn case_insensitive_paths(&self) -> bool {
        matches!(self, Self::Windows | Self::MacOs)
    }
}

/// Snapshot of the environment that per-OS path computation depends on.
///
/// Everything that reads live environment variables happens in
/// [`Platform::current`]; all other methods are pure functions over the
/// captured values, so tests can build a descriptor by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub family: OsFamily,
    /// User home directory
    pub home_dir: Option<PathBuf>,
    /// `%LOCALAPPDATA%` (Windows only)
    pub local_app_data: Option<PathBuf>,
    /// `%APPDATA%` (Windows only)
    pub roaming_app_data: Option<PathBuf>,
    /// Base for resolving relative paths
    pub current_dir: PathBuf,
}

impl Platform {
    /// Capture the descriptor of the running system
    pub fn current() -> Self {
        Self {
            family: OsFamily::current(),
            home_dir: dirs::home_dir(),
            local_app_data: std::env::var_os("LOCALAPPDATA").map(PathBuf::from),
            roaming_app_data: std::env::var_os("APPDATA").map(PathBuf::from),
            current_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Descriptor for `family` with a home directory and nothing else
    pub fn with_home(family: OsFamily, home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            family,
            current_dir: home.clone(),
            home_dir: Some(home),
            local_app_data: None,
            roaming_app_data: None,
        }
    }

    /// The browser's own profile directory, used when no `--user-data-dir` is given
    pub fn default_profile_dir(&self) -> Option<PathBuf> {
        match self.family {
            OsFamily::Windows => self
                .local_app_data
                .as_ref()
                .map(|base| base.join("Google").join("Chrome").join("User Data")),
            OsFamily::MacOs => self.home_dir.as_ref().map(|home| {
                home.join("Library")
                    .join("Application Support")
                    .join("Google")
                    .join("Chrome")
            }),
            OsFamily::Linux => self
                .home_dir
                .as_ref()
                .map(|home| home.join(".config").join("google-chrome")),
            OsFamily::Other => None,
        }
    }

    /// Directory holding the registry and settings files
    pub fn config_dir(&self) -> PathBuf {
        let fallback = || PathBuf::from(".").join(crate::APP_NAME);
        match self.family {
            OsFamily::Windows => match (&self.roaming_app_data, &self.home_dir) {
                (Some(app_data), _) => app_data.join(crate::APP_NAME),
                (None, Some(home)) => home.join("AppData").join("Roaming").join(crate::APP_NAME),
                (None, None) => fallback(),
            },
            OsFamily::MacOs | OsFamily::Linux => self
                .home_dir
                .as_ref()
                .map(|home| home.join(".config").join(crate::APP_NAME))
                .unwrap_or_else(fallback),
            OsFamily::Other => self
                .home_dir
                .as_ref()
                .map(|home| home.join(format!(".{}", crate::APP_NAME)))
                .unwrap_or_else(fallback),
        }
    }

    pub fn registry_file(&self) -> PathBuf {
        self.config_dir().join("profiles.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    /// Make `path` absolute against `current_dir` and resolve `.`/`..` lexically
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        let joined = if self.is_absolute(path) {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        };

        let mut clean = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if matches!(clean.components().next_back(), Some(Component::Normal(_))) {
                        clean.pop();
                    }
                }
                other => clean.push(other.as_os_str()),
            }
        }
        clean
    }

    /// Absolute form of `path` rendered with the platform's separators
    pub fn normalized_display(&self, path: &Path) -> String {
        let absolute = self.absolutize(path).to_string_lossy().into_owned();
        match self.family {
            OsFamily::Windows => absolute.replace('/', "\\"),
            _ => absolute,
        }
    }

    /// Whether two directories refer to the same place for registry purposes.
    /// Case is always ignored so that `D:\Work` and `d:\work` collide.
    pub fn same_dir(&self, a: &Path, b: &Path) -> bool {
        self.normalized_display(a)
            .eq_ignore_ascii_case(&self.normalized_display(b))
    }

    fn is_absolute(&self, path: &Path) -> bool {
        if self.family == OsFamily::Windows {
            let raw = path.to_string_lossy();
            let bytes = raw.as_bytes();
            let drive = bytes.len() >= 3
                && bytes[0].is_ascii_alphabetic()
                && bytes[1] == b':'
                && matches!(bytes[2], b'\\' | b'/');
            return drive || raw.starts_with("\\\\") || path.is_absolute();
        }
        path.has_root()
    }
}

/// Result of a termination request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The OS accepted the request
    Requested,
    /// No such process existed any more
    AlreadyExited,
}

/// Ask a process to terminate (SIGTERM on Unix)
pub fn terminate_process(pid: u32) -> std::io::Result<Termination> {
    #[cfg(windows)]
    {
        windows::terminate_process(pid)
    }
    #[cfg(unix)]
    {
        unix::terminate_process(pid)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = pid;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process termination is not supported on this platform",
        ))
    }
}
