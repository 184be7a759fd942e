//! Core module - Profiles, process discovery and instance supervision

mod error;
mod instance;
mod matcher;
mod process;
pub mod profile;
mod registry;
pub mod settings;
mod supervisor;

pub use error::{Error, Result};
pub use instance::{ExitOutcome, Instance, InstanceSnapshot, InstanceStatus};
pub use matcher::{
    matcher_for, CommandLineRules, ProcessMatcher, SystemProcessMatcher, UnsupportedMatcher,
};
pub use process::{
    build_launch_command, LaunchCommand, LaunchTarget, SUPPRESSION_FLAGS, USER_DATA_DIR_FLAG,
};
pub use profile::{Profile, DEFAULT_PROFILE_NAME};
pub use registry::ProfileRegistry;
pub use settings::Settings;
pub use supervisor::InstanceSupervisor;
