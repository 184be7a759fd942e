//! Profiles - Named isolation directories, one per browser instance

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Name reserved for the browser's own default profile
pub const DEFAULT_PROFILE_NAME: &str = "[Default]";

/// A named isolation directory.
///
/// The default profile carries an empty directory and is never written to
/// disk; `is_default` is therefore not serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name, unique within a registry
    pub name: String,
    /// Directory passed as `--user-data-dir`, empty for the default profile
    #[serde(rename = "user_data_dir")]
    pub isolation_dir: String,
    #[serde(skip)]
    pub is_default: bool,
}

impl Profile {
    pub fn new(name: impl Into<String>, isolation_dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isolation_dir: isolation_dir.into(),
            is_default: false,
        }
    }

    /// The always-present sentinel profile
    pub fn default_profile() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            isolation_dir: String::new(),
            is_default: true,
        }
    }

    /// Directory to look for on command lines, `None` meaning "no directory argument"
    pub fn isolation_dir(&self) -> Option<&Path> {
        if self.is_default || self.isolation_dir.is_empty() {
            None
        } else {
            Some(Path::new(&self.isolation_dir))
        }
    }

    /// Directory shown to users
    pub fn display_dir(&self) -> &str {
        if self.is_default {
            "(browser default)"
        } else {
            &self.isolation_dir
        }
    }
}
