//! Error types for the vpcc codec

use thiserror::Error;

/// Result type alias for vpcc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vpcc
///
/// The patch/occupancy protocol is a single-pass pull parser: there is no
/// recovery or resynchronization once the arithmetic coder state is lost, so
/// every variant here either aborts the decode or never reaches the caller
/// (recoverable inconsistencies are reported through `tracing` and decoding
/// continues with a defined fallback).
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or a declared segment length exceeds the remaining buffer
    #[error("bitstream underflow at offset {offset}: need {need} bytes, {have} available")]
    StreamUnderflow {
        /// Byte offset of the cursor when the underflow was detected
        offset: usize,
        /// Bytes the operation required
        need: usize,
        /// Bytes actually remaining
        have: usize,
    },

    /// The stream decoded to a state the protocol cannot represent
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// Inter-mode back-reference outside the previous frame's patch list
    #[error("reference patch index {index} out of range: previous frame has {count} patches")]
    ReferenceOutOfRange {
        /// The decoded reference index
        index: i64,
        /// Patch count of the previous frame
        count: usize,
    },

    /// Declared dimensions disagree with a decoded collaborator stream
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// Feature combination the codec does not support
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Library initialization failed
    #[error("initialization error: {0}")]
    Init(String),
}

impl Error {
    /// Create a corrupt-stream error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Error::Corrupt(msg.into())
    }

    /// Create a configuration mismatch error
    pub fn config_mismatch<S: Into<String>>(msg: S) -> Self {
        Error::ConfigurationMismatch(msg.into())
    }

    /// Create an unsupported-feature error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Whether this error means the stream itself is damaged
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Error::StreamUnderflow { .. } | Error::Corrupt(_) | Error::ReferenceOutOfRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::StreamUnderflow {
            offset: 12,
            need: 4,
            have: 1,
        };
        assert!(err.to_string().contains("offset 12"));

        let err = Error::ReferenceOutOfRange { index: 7, count: 3 };
        assert!(err.to_string().contains("7"));
        assert!(err.is_stream_error());
    }

    #[test]
    fn test_convenience_constructors() {
        assert!(matches!(Error::corrupt("x"), Error::Corrupt(_)));
        assert!(!Error::config_mismatch("x").is_stream_error());
    }
}
