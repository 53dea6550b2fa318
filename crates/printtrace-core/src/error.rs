// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for PrintTrace, and the mapping from the engine's
// numeric result codes into them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all PrintTrace operations.
///
/// `Clone` because the controller both records the most recent failure for
/// polling and rejects the pending operation with the same value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrintTraceError {
    // -- Input --
    #[error("invalid input")]
    InvalidInput,

    #[error("input file not found")]
    FileNotFound,

    #[error("image could not be loaded")]
    ImageLoadFailed,

    #[error("image is too small to process")]
    ImageTooSmall,

    // -- Detection --
    #[error("no contours found")]
    NoContoursFound,

    #[error("no paper boundary detected")]
    NoBoundaryDetected,

    #[error("no object detected on the paper")]
    NoObjectDetected,

    // -- Output --
    #[error("failed to write output file")]
    OutputWriteFailed,

    // -- Processing --
    #[error("invalid processing parameters: {0}")]
    InvalidParameters(String),

    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error("another operation is already in progress")]
    AlreadyInProgress,

    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown engine error: {0}")]
    Unknown(String),

    // -- Geometry --
    #[error("pixels-per-millimetre must be finite and positive, got {0}")]
    InvalidScale(f64),

    #[error("invalid contour geometry: {0}")]
    InvalidGeometry(String),

    // -- Configuration --
    #[error("configuration error: {0}")]
    Config(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintTraceError>;

/// Raw result code returned by the PrintTrace engine.
///
/// The engine speaks plain C integers; any value outside the named constants
/// is still representable and maps to [`PrintTraceError::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SUCCESS: Self = Self(0);
    pub const INVALID_INPUT: Self = Self(1);
    pub const FILE_NOT_FOUND: Self = Self(2);
    pub const IMAGE_LOAD_FAILED: Self = Self(3);
    pub const IMAGE_TOO_SMALL: Self = Self(4);
    pub const NO_CONTOURS_FOUND: Self = Self(5);
    pub const NO_BOUNDARY_DETECTED: Self = Self(6);
    pub const NO_OBJECT_DETECTED: Self = Self(7);
    pub const OUTPUT_WRITE_FAILED: Self = Self(8);
    pub const INVALID_PARAMETERS: Self = Self(9);
    pub const PROCESSING_FAILED: Self = Self(10);
    pub const CANCELLED: Self = Self(11);

    /// Every failure code the engine defines (excludes `SUCCESS`).
    pub const DEFINED_FAILURES: [Self; 11] = [
        Self::INVALID_INPUT,
        Self::FILE_NOT_FOUND,
        Self::IMAGE_LOAD_FAILED,
        Self::IMAGE_TOO_SMALL,
        Self::NO_CONTOURS_FOUND,
        Self::NO_BOUNDARY_DETECTED,
        Self::NO_OBJECT_DETECTED,
        Self::OUTPUT_WRITE_FAILED,
        Self::INVALID_PARAMETERS,
        Self::PROCESSING_FAILED,
        Self::CANCELLED,
    ];

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PrintTraceError {
    /// Map an engine result code (plus whatever message the engine offered)
    /// into the error taxonomy.
    ///
    /// Total: unrecognised codes become `Unknown` carrying `message`
    /// verbatim. `SUCCESS` is not an error, so handing it here is a caller
    /// bug and also lands in `Unknown`.
    pub fn from_foreign(code: ErrorCode, message: &str) -> Self {
        match code {
            ErrorCode::INVALID_INPUT => Self::InvalidInput,
            ErrorCode::FILE_NOT_FOUND => Self::FileNotFound,
            ErrorCode::IMAGE_LOAD_FAILED => Self::ImageLoadFailed,
            ErrorCode::IMAGE_TOO_SMALL => Self::ImageTooSmall,
            ErrorCode::NO_CONTOURS_FOUND => Self::NoContoursFound,
            ErrorCode::NO_BOUNDARY_DETECTED => Self::NoBoundaryDetected,
            ErrorCode::NO_OBJECT_DETECTED => Self::NoObjectDetected,
            ErrorCode::OUTPUT_WRITE_FAILED => Self::OutputWriteFailed,
            ErrorCode::INVALID_PARAMETERS => Self::InvalidParameters(message.to_owned()),
            ErrorCode::PROCESSING_FAILED => Self::ProcessingFailed(message.to_owned()),
            ErrorCode::CANCELLED => Self::Cancelled,
            _ => Self::Unknown(message.to_owned()),
        }
    }

    /// Convert an engine result into `Ok(())` or the mapped error.
    pub fn check(code: ErrorCode, message: &str) -> Result<()> {
        if code.is_success() {
            Ok(())
        } else {
            Err(Self::from_foreign(code, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::discriminant;

    #[test]
    fn every_defined_code_maps_to_a_distinct_known_member() {
        let mapped: Vec<PrintTraceError> = ErrorCode::DEFINED_FAILURES
            .iter()
            .map(|&code| PrintTraceError::from_foreign(code, "detail"))
            .collect();

        for (i, err) in mapped.iter().enumerate() {
            assert!(
                !matches!(err, PrintTraceError::Unknown(_)),
                "code {} mapped to Unknown",
                ErrorCode::DEFINED_FAILURES[i]
            );
            for other in &mapped[i + 1..] {
                assert_ne!(discriminant(err), discriminant(other));
            }
        }
    }

    #[test]
    fn unrecognised_code_keeps_message_verbatim() {
        let err = PrintTraceError::from_foreign(ErrorCode(42), "OpenCV: assertion failed (ksize > 0)");
        assert_eq!(
            err,
            PrintTraceError::Unknown("OpenCV: assertion failed (ksize > 0)".into())
        );

        let negative = PrintTraceError::from_foreign(ErrorCode(-1), "");
        assert_eq!(negative, PrintTraceError::Unknown(String::new()));
    }

    #[test]
    fn success_is_not_an_error() {
        assert!(PrintTraceError::check(ErrorCode::SUCCESS, "").is_ok());
        assert!(matches!(
            PrintTraceError::from_foreign(ErrorCode::SUCCESS, "oops"),
            PrintTraceError::Unknown(_)
        ));
    }

    #[test]
    fn never_maps_to_already_in_progress() {
        for raw in -5..64 {
            let err = PrintTraceError::from_foreign(ErrorCode(raw), "x");
            assert_ne!(err, PrintTraceError::AlreadyInProgress);
        }
    }
}
