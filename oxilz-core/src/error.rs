//! Error types for OxiLz operations.
//!
//! This module provides one error type that covers all error conditions in
//! the codec crates: I/O errors, malformed headers and properties, and
//! coding errors detected mid-stream.

use std::io;
use thiserror::Error;

/// The main error type for OxiLz operations.
#[derive(Debug, Error)]
pub enum OxiLzError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid stream header.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Invalid codec properties.
    #[error("Invalid properties: {message}")]
    InvalidProperties {
        /// Description of the property error.
        message: String,
    },

    /// The compressed stream ended in the middle of an operation.
    #[error("Unexpected end of compressed stream")]
    ShortInput,

    /// An end-of-stream marker was decoded before the declared length was
    /// reached.
    #[error("Unexpected end of stream marker")]
    UnexpectedEos,

    /// Decoding produced more bytes than the declared uncompressed length.
    #[error("Decoded stream exceeds declared length {declared}")]
    OverlongStream {
        /// Declared uncompressed length.
        declared: u64,
    },

    /// An end-of-stream marker was decoded but the range coder still holds
    /// undelivered data.
    #[error("End of stream marker with pending range coder data")]
    WrongTermination,

    /// Invalid back-reference distance.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history}")]
    InvalidDistance {
        /// The invalid distance value.
        distance: usize,
        /// Current history length.
        history: usize,
    },

    /// A write does not fit the remaining buffer space. The caller can
    /// recover by draining the buffer and writing again.
    #[error("Write of {len} bytes exceeds buffer space {available}")]
    WriteTooBig {
        /// Number of bytes in the rejected write.
        len: usize,
        /// Number of bytes the buffer can accept.
        available: usize,
    },

    /// The number of bytes given to the encoder does not match the declared
    /// uncompressed size.
    #[error("Declared uncompressed size {declared} does not match written size {written}")]
    DeclaredSizeMismatch {
        /// Size announced in the stream header.
        declared: u64,
        /// Bytes actually encoded.
        written: u64,
    },
}

/// Result type alias for OxiLz operations.
pub type Result<T> = std::result::Result<T, OxiLzError>;

impl OxiLzError {
    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an invalid properties error.
    pub fn invalid_properties(message: impl Into<String>) -> Self {
        Self::InvalidProperties {
            message: message.into(),
        }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: usize, history: usize) -> Self {
        Self::InvalidDistance { distance, history }
    }

    /// Create a write-too-big error.
    pub fn write_too_big(len: usize, available: usize) -> Self {
        Self::WriteTooBig { len, available }
    }

    /// Produce an equivalent error.
    ///
    /// The enum is not `Clone` because `io::Error` is not. A codec that has
    /// failed keeps the original error and surfaces a duplicate on every
    /// later call.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::InvalidHeader { message } => Self::InvalidHeader {
                message: message.clone(),
            },
            Self::InvalidProperties { message } => Self::InvalidProperties {
                message: message.clone(),
            },
            Self::ShortInput => Self::ShortInput,
            Self::UnexpectedEos => Self::UnexpectedEos,
            Self::OverlongStream { declared } => Self::OverlongStream {
                declared: *declared,
            },
            Self::WrongTermination => Self::WrongTermination,
            Self::InvalidDistance { distance, history } => Self::InvalidDistance {
                distance: *distance,
                history: *history,
            },
            Self::WriteTooBig { len, available } => Self::WriteTooBig {
                len: *len,
                available: *available,
            },
            Self::DeclaredSizeMismatch { declared, written } => Self::DeclaredSizeMismatch {
                declared: *declared,
                written: *written,
            },
        }
    }
}
