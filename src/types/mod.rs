//! Public types for the config settings engine
//!
//! This module contains the shared error and option types used across the crate.

mod config;
mod error;

pub use config::{ChangeOptions, DEFAULT_SETTINGS_FILE_NAME, WatchOptions};
pub use error::{ErrorCode, Result, SettingsError};
