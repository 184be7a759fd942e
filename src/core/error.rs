//! Error types shared by the registry and the supervisor

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Every failure is local to one call and returned to its caller
#[derive(Debug, Error)]
pub enum Error {
    /// Bad profile name or directory
    #[error("invalid profile: {0}")]
    Validation(String),

    /// Attempted to modify the built-in default profile
    #[error("profile '{0}' is reserved and cannot be modified")]
    ProtectedEntity(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    /// Reading or writing persisted state failed
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("instance '{0}' is already running")]
    AlreadyRunning(String),

    #[error("instance '{0}' is not running")]
    NotRunning(String),

    /// The OS refused to spawn the browser
    #[error("failed to launch instance '{name}': {source}")]
    Launch {
        name: String,
        #[source]
        source: io::Error,
    },

    /// No termination path succeeded; the instance is still considered running
    #[error("failed to stop instance '{name}': {reason}")]
    Stop { name: String, reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: impl Into<io::Error>) -> Self {
        Self::Io {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
