//! Error tracing extensions
//!
//! Logs a [`SettingsError`] once, with its code, the file it concerns and
//! its source chain, at the point where a caller gives up on it.

use std::error::Error as StdError;
use std::path::Path;

use crate::types::SettingsError;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log the error with its code, file and source chain
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for SettingsError {
    fn trace_error(&self) -> &Self {
        let error_code = self.error_code();
        let file = error_file(self).map(Path::display);

        let mut error_chain = Vec::new();
        let mut current_source = self.source();
        while let Some(source) = current_source {
            error_chain.push(source.to_string());
            current_source = source.source();
        }

        if self.is_client_error() {
            tracing::error!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                file = file.map(tracing::field::display),
                "Invalid settings or template"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                file = file.map(tracing::field::display),
                error_chain = ?error_chain,
                "Settings operation failed"
            );
        }

        self
    }
}

/// File a settings error is about, when it names one
fn error_file(error: &SettingsError) -> Option<&Path> {
    match error {
        SettingsError::Parse { file, .. } | SettingsError::ImportCycle { file } => Some(file.as_path()),
        SettingsError::Write { path, .. } => Some(path.as_path()),
        _ => None,
    }
}

/// Extension trait for Result types
pub trait ResultTraceExt<T> {
    /// Convert the error to a [`SettingsError`] and log it
    fn trace_context(self) -> Result<T, SettingsError>;
}

impl<T, E> ResultTraceExt<T> for Result<T, E>
where
    SettingsError: From<E>,
{
    fn trace_context(self) -> Result<T, SettingsError> {
        self.map_err(|e| {
            let error = SettingsError::from(e);
            error.trace_error();
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCode;
    use std::path::PathBuf;

    #[test]
    fn test_error_file() {
        let error = SettingsError::parse("/cfg/base.xml", "unexpected end");
        assert_eq!(error_file(&error), Some(Path::new("/cfg/base.xml")));
        assert!(matches!(error.trace_error(), SettingsError::Parse { .. }));

        let error = SettingsError::config_error("no settings root");
        assert_eq!(error_file(&error), None);
    }

    #[test]
    fn test_trace_context_converts_io_errors() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));

        let error = result.trace_context().unwrap_err();
        assert_eq!(error.error_code(), ErrorCode::IoError);
    }

    #[test]
    fn test_trace_context_keeps_settings_errors() {
        let result: crate::types::Result<()> = Err(SettingsError::ImportCycle {
            file: PathBuf::from("/cfg/a.xml"),
        });
        let error = result.trace_context().unwrap_err();
        assert_eq!(error_file(&error), Some(Path::new("/cfg/a.xml")));
    }
}
