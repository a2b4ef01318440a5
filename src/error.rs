//! Error types for the archive engine.
//!
//! The taxonomy mirrors the six failure kinds the core distinguishes:
//! precondition violations, format errors, unsupported codecs/ciphers,
//! integrity (CRC) failures, I/O errors from the base stream, and
//! end-of-list while iterating the central directory.

use std::fmt;
use std::io;

/// Result type for archive engine operations.
pub type Result<T> = std::result::Result<T, SZipError>;

/// Error types that can occur during ZIP operations.
#[derive(Debug)]
pub enum SZipError {
    /// Precondition violated: bad argument, wrong mode, illegal call order.
    Param(String),
    /// Scratch buffer or allocation could not grow to hold variable-length data.
    Mem(String),
    /// I/O error from the base stream.
    Stream(io::Error),
    /// Archive structure is malformed: bad signature, impossible size relation,
    /// malformed extra field, bad AES magic.
    Format(String),
    /// CRC32 recorded in the central directory does not match the decoded bytes.
    Crc { expected: u32, actual: u32 },
    /// Compression method or cipher not enabled in this build, or not recognized.
    Support(String),
    /// Requested entry does not exist in the archive.
    Exist(String),
    /// Iteration ran past the last entry (EOCD reached, or CD exhausted).
    EndOfList,
    /// Invariant the implementation itself should have upheld was violated.
    Internal(String),
}

impl fmt::Display for SZipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SZipError::Param(msg) => write!(f, "invalid argument: {msg}"),
            SZipError::Mem(msg) => write!(f, "allocation failure: {msg}"),
            SZipError::Stream(e) => write!(f, "stream I/O error: {e}"),
            SZipError::Format(msg) => write!(f, "malformed archive: {msg}"),
            SZipError::Crc { expected, actual } => write!(
                f,
                "CRC mismatch: expected {expected:#010x}, got {actual:#010x}"
            ),
            SZipError::Support(msg) => write!(f, "unsupported: {msg}"),
            SZipError::Exist(name) => write!(f, "entry not found: {name}"),
            SZipError::EndOfList => write!(f, "end of central directory reached"),
            SZipError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for SZipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SZipError::Stream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SZipError {
    fn from(err: io::Error) -> Self {
        SZipError::Stream(err)
    }
}

impl SZipError {
    pub(crate) fn format<S: Into<String>>(msg: S) -> Self {
        SZipError::Format(msg.into())
    }

    pub(crate) fn param<S: Into<String>>(msg: S) -> Self {
        SZipError::Param(msg.into())
    }

    pub(crate) fn internal<S: Into<String>>(msg: S) -> Self {
        SZipError::Internal(msg.into())
    }
}
