//! multiprofile - Run isolated browser instances side by side
//!
//! Each instance is bound to its own persistent profile directory. The
//! supervisor launches instances, recognises ones started elsewhere, stops
//! them, and keeps its view of what is running in line with the OS.

pub mod core;
pub mod persistence;
pub mod platform;

pub use crate::core::{Error, Result};

/// Application name constant
pub const APP_NAME: &str = "multiprofile";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
