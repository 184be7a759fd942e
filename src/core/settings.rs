//! Application settings management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{Error, Result};
use crate::platform::Platform;

/// Application settings, read from `settings.json` next to the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Browser executable to launch instead of the platform default
    pub executable: Option<PathBuf>,
    /// Arguments appended after the built-in launch flags
    pub extra_args: Vec<String>,
    /// Custom location of the profile registry file
    pub registry_path: Option<PathBuf>,
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: Option<String>,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing or unreadable
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_else(|e| {
            warn!("Using default settings: {}", e);
            Self::default()
        })
    }

    /// Load and validate settings; a missing file gives defaults.
    ///
    /// Callers that load settings before logging is set up should use this
    /// and report the error once a subscriber is installed.
    pub fn try_load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::io(path, e)),
        };

        let mut settings: Settings =
            serde_json::from_str(&data).map_err(|e| Error::io(path, e))?;
        // Validate and fix any invalid values after deserialization
        settings.validate();
        Ok(settings)
    }

    /// Drop blank values that would otherwise produce broken launches
    pub fn validate(&mut self) {
        if self
            .executable
            .as_ref()
            .is_some_and(|exe| exe.as_os_str().to_string_lossy().trim().is_empty())
        {
            self.executable = None;
        }
        if self
            .registry_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            self.registry_path = None;
        }
        self.extra_args.retain(|arg| !arg.trim().is_empty());
        if self.log_filter.as_deref().is_some_and(|f| f.trim().is_empty()) {
            self.log_filter = None;
        }
    }

    /// Get the registry file, using the platform default if not set
    pub fn registry_file(&self, platform: &Platform) -> PathBuf {
        self.registry_path
            .as_ref()
            .map(|path| platform.absolutize(path))
            .unwrap_or_else(|| platform.registry_file())
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn log_filter(&self) -> String {
        match (&self.log_filter, self.debug_logging) {
            (Some(filter), _) => filter.clone(),
            (None, true) => format!("{}=debug", crate::APP_NAME),
            (None, false) => format!("{}=info", crate::APP_NAME),
        }
    }
}
