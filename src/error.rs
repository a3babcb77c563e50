//! Error types for atento
//!
//! All fallible operations in the crate return [`Result`]. Errors are
//! surfaced synchronously to the caller of the failing operation; there is
//! no retry policy and no partial result is ever returned.

/// Errors produced by weight conversion and the forward pass
#[derive(Debug, Clone, PartialEq)]
pub enum AtentoError {
    /// Source parameters are malformed or inconsistent at conversion time.
    ///
    /// Construction aborts; no partial module is returned.
    ConversionError {
        /// What was inconsistent about the source parameters
        reason: String,
    },
    /// Tensor shape mismatch at call time.
    ///
    /// The failing call returns an error; the module remains valid for
    /// subsequent calls.
    InvalidShape {
        /// Which shape constraint was violated
        reason: String,
    },
    /// NaN or Inf detected in a computation result.
    ///
    /// Only checked in debug builds; never part of the release fast path.
    NumericError {
        /// Where the non-finite value was observed
        reason: String,
    },
}

impl std::fmt::Display for AtentoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtentoError::ConversionError { reason } => {
                write!(f, "Weight conversion failed: {reason}")
            }
            AtentoError::InvalidShape { reason } => write!(f, "Invalid shape: {reason}"),
            AtentoError::NumericError { reason } => write!(f, "Numeric error: {reason}"),
        }
    }
}

impl std::error::Error for AtentoError {}

/// Result type alias using [`AtentoError`]
pub type Result<T> = std::result::Result<T, AtentoError>;
