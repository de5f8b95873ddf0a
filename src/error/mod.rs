// Error types for the seismic PSD toolkit
//
// This module defines custom error types for PSD computation and result
// storage, providing structured error handling with numeric error codes so
// batch drivers can report failures per file and keep going.

mod psd;
mod store;

pub use psd::{log_psd_error, ErrorKind, PsdError, PsdErrorCodes};
pub use store::{log_store_error, StoreError, StoreErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the engine, storage layer and command-line front end.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_trait_objects() {
        let psd_err: &dyn ErrorCode = &PsdError::InvalidSensitivity { sensitivity: 0.0 };
        assert_eq!(psd_err.code(), PsdErrorCodes::INVALID_SENSITIVITY);

        let store_err: &dyn ErrorCode = &StoreError::UnsupportedFormat {
            extension: "seg2".to_string(),
        };
        assert_eq!(store_err.code(), StoreErrorCodes::UNSUPPORTED_FORMAT);
    }

    #[test]
    fn test_code_ranges_do_not_overlap() {
        let psd_codes = [
            PsdErrorCodes::INVALID_OVERLAP,
            PsdErrorCodes::DEGENERATE_SPECTRUM,
        ];
        let store_codes = [
            StoreErrorCodes::UNSUPPORTED_FORMAT,
            StoreErrorCodes::NAME_PARSE_FAILED,
        ];
        for code in psd_codes {
            assert!((3001..4000).contains(&code));
        }
        for code in store_codes {
            assert!((4001..5000).contains(&code));
        }
    }
}
