//! Error types for the binary wire codec.

use thiserror::Error;

/// Failures raised while decoding or encoding wire payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended before the value was complete.
    #[error("unexpected end of buffer")]
    UnexpectedEof {
        /// Cursor position when the read was attempted.
        at: usize,
        /// Bytes the read required.
        needed: usize,
    },
    /// An unknown type tag was encountered.
    #[error("unknown type tag")]
    UnknownTag {
        /// The offending tag byte.
        tag: u8,
        /// Cursor position of the tag.
        at: usize,
    },
    /// An ASCII integer literal exceeded the allowed length.
    #[error("integer literal too long")]
    IntTooLong {
        /// Observed literal length.
        len: usize,
    },
    /// An ASCII integer or length literal contained a non-digit byte.
    #[error("malformed integer literal")]
    MalformedInt {
        /// Cursor position of the literal.
        at: usize,
    },
    /// A string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8 {
        /// Cursor position of the string payload.
        at: usize,
    },
    /// A dictionary key was neither a string nor a number.
    #[error("dictionary key must be a string or number")]
    InvalidKey {
        /// Cursor position of the key.
        at: usize,
    },
    /// Decoding finished with unconsumed bytes remaining.
    #[error("trailing bytes after value")]
    Trailing {
        /// Number of unconsumed bytes.
        remaining: usize,
    },
}

/// Convenience alias for codec results.
pub type WireResult<T> = Result<T, WireError>;
