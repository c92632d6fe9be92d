//! Error types for the config settings engine

use std::path::PathBuf;

use thiserror::Error;

use crate::xml::XmlError;

/// Stable error codes, usable as process exit codes by the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed settings file
    ParseError = 2,
    /// Import chain points back at a file already on the chain
    ImportCycle = 3,
    /// Missing resolver, store without a root file and similar misuse
    ConfigError = 4,
    /// Output or settings file could not be written
    WriteError = 5,
    /// Any other I/O failure
    IoError = 6,
    /// Malformed target document or block markup
    XmlError = 7,
    /// Block payload did not map onto the requested type
    BlockContentError = 8,
    /// File watching could not be set up
    WatchError = 9,
}

impl ErrorCode {
    /// Get the error code value
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Main error type for loading, patching and writing configs
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file (root or import) is not well-formed XML
    #[error("Failed to parse settings file {}: {message}", file.display())]
    Parse { file: PathBuf, message: String },

    /// An import re-enters a file already being parsed
    #[error("Import cycle detected at {}", file.display())]
    ImportCycle { file: PathBuf },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Writing a settings or live file failed
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Block content could not be mapped to a typed value
    #[error("Invalid content of block '{name}': {message}")]
    BlockContent { name: String, message: String },

    /// Watcher setup failed
    #[error("Watch error: {0}")]
    Watch(String),

    /// Malformed target document
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the config settings engine
pub type Result<T> = std::result::Result<T, SettingsError>;

impl SettingsError {
    /// Get the error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            SettingsError::Parse { .. } => ErrorCode::ParseError,
            SettingsError::ImportCycle { .. } => ErrorCode::ImportCycle,
            SettingsError::Configuration(_) => ErrorCode::ConfigError,
            SettingsError::Write { .. } => ErrorCode::WriteError,
            SettingsError::BlockContent { .. } => ErrorCode::BlockContentError,
            SettingsError::Watch(_) => ErrorCode::WatchError,
            SettingsError::Xml(_) => ErrorCode::XmlError,
            SettingsError::Io(_) => ErrorCode::IoError,
        }
    }

    /// Check if this error was caused by bad input files rather than the environment
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SettingsError::Parse { .. }
                | SettingsError::ImportCycle { .. }
                | SettingsError::Xml(_)
                | SettingsError::BlockContent { .. }
        )
    }

    /// Check if a settings file or the target document is malformed XML
    pub fn is_parse_error(&self) -> bool {
        matches!(self, SettingsError::Parse { .. } | SettingsError::Xml(_))
    }

    // === Constructor helpers ===

    /// Create a parse error for a settings file
    pub fn parse(file: impl Into<PathBuf>, message: impl ToString) -> Self {
        SettingsError::Parse {
            file: file.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        SettingsError::Configuration(msg.into())
    }

    /// Create a write error
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SettingsError::Write {
            path: path.into(),
            source,
        }
    }

    /// Create a block content error
    pub fn block_content(name: impl Into<String>, message: impl ToString) -> Self {
        SettingsError::BlockContent {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Create a watcher error
    pub fn watch(msg: impl Into<String>) -> Self {
        SettingsError::Watch(msg.into())
    }
}
