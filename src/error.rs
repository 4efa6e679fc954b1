//! Error types for settings loading.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Errors raised by the settings loader.
///
/// Loading is deliberately forgiving: missing files and malformed documents
/// are logged and skipped. The variants here cover the few paths that are
/// fatal for the call that hit them.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Config directory exists but cannot be read or traversed.
    #[error("insufficient permissions for loading: {directory}")]
    InsufficientPermissions { directory: PathBuf },

    /// IO error while writing the loaded-files manifest.
    #[error("failed to write loaded-files manifest at {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
