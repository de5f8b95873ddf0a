// Waveform loading and result storage error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;
use std::path::Path;

/// Storage error code constants
///
/// Error code range: 4001-4005
pub struct StoreErrorCodes {}

impl StoreErrorCodes {
    /// No reader is registered for the file extension
    pub const UNSUPPORTED_FORMAT: i32 = 4001;

    /// File could not be opened or read
    pub const READ_FAILED: i32 = 4002;

    /// File could not be created or written
    pub const WRITE_FAILED: i32 = 4003;

    /// File contents do not match the expected layout
    pub const MALFORMED: i32 = 4004;

    /// File name does not follow the project naming convention
    pub const NAME_PARSE_FAILED: i32 = 4005;
}

/// Log a storage error with structured context
pub fn log_store_error(err: &StoreError, context: &str) {
    error!(
        "Store error in {}: code={}, component=PsdStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while reading waveforms or reading/writing PSD results
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No reader handles this extension
    UnsupportedFormat { extension: String },

    /// I/O failure while reading
    ReadFailed { path: String, reason: String },

    /// I/O failure while writing
    WriteFailed { path: String, reason: String },

    /// Contents could not be decoded
    Malformed { path: String, reason: String },

    /// File name did not match the configured convention
    NameParseFailed { name: String, reason: String },
}

impl StoreError {
    pub(crate) fn read(path: &Path, reason: impl fmt::Display) -> Self {
        StoreError::ReadFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: &Path, reason: impl fmt::Display) -> Self {
        StoreError::WriteFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(path: &Path, reason: impl fmt::Display) -> Self {
        StoreError::Malformed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl ErrorCode for StoreError {
    fn code(&self) -> i32 {
        match self {
            StoreError::UnsupportedFormat { .. } => StoreErrorCodes::UNSUPPORTED_FORMAT,
            StoreError::ReadFailed { .. } => StoreErrorCodes::READ_FAILED,
            StoreError::WriteFailed { .. } => StoreErrorCodes::WRITE_FAILED,
            StoreError::Malformed { .. } => StoreErrorCodes::MALFORMED,
            StoreError::NameParseFailed { .. } => StoreErrorCodes::NAME_PARSE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            StoreError::UnsupportedFormat { extension } => {
                format!("Unsupported file format: {}", extension)
            }
            StoreError::ReadFailed { path, reason } => {
                format!("Failed to read {}: {}", path, reason)
            }
            StoreError::WriteFailed { path, reason } => {
                format!("Failed to write {}: {}", path, reason)
            }
            StoreError::Malformed { path, reason } => {
                format!("Malformed file {}: {}", path, reason)
            }
            StoreError::NameParseFailed { name, reason } => {
                format!("Cannot parse file name '{}': {}", name, reason)
            }
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::ReadFailed {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}
