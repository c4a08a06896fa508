//! Error types for the apex-adjust library
//!
//! Configuration problems (bad option strings, unsupported camera/option
//! combinations, unreadable inputs) are reported through [`AdjustError`] and
//! abort the current operation before any persistent state is touched.
//! Programming errors such as an out-of-range camera index panic instead.

use std::{io, num::ParseFloatError, path::PathBuf};
use thiserror::Error;

/// Main result type used throughout the apex-adjust library
pub type AdjustResult<T> = Result<T, AdjustError>;

/// Main error type for the apex-adjust library
#[derive(Debug, Error)]
pub enum AdjustError {
    /// Invalid configuration or option combination
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File system errors with the offending path
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed content in a camera, adjustment or transform file
    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Footprint metadata could not be read for an image
    #[error("Unable to get corner estimate from file: {path}")]
    UnreadableMetadata { path: PathBuf },

    /// A camera of the wrong family was handed to a family-specific path
    #[error("Camera {index}: expecting a {expected} camera, found {found}")]
    CameraTypeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// Projection of a point failed
    #[error("Projection error: {0}")]
    Projection(String),
}

impl AdjustError {
    /// Attach a path to an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AdjustError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ParseFloatError> for AdjustError {
    fn from(err: ParseFloatError) -> Self {
        AdjustError::InvalidInput(format!("Failed to parse float: {err}"))
    }
}

/// Convenience macro for creating invalid-input errors
#[macro_export]
macro_rules! invalid_input {
    ($msg:expr) => {
        $crate::error::AdjustError::InvalidInput($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::AdjustError::InvalidInput(format!($fmt, $($arg)*))
    };
}
