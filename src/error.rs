//! Error types for the streaming ZIP reader.

use std::fmt;
use std::io;

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading a ZIP stream.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying source.
    Io(io::Error),
    /// Unexpected EOF inside a header, name, extra, body, descriptor, or scavenger scan.
    Truncated(&'static str),
    /// Structurally invalid archive data: bad ZIP64 extra, corrupt inflate stream, CRC mismatch.
    Malformed(String),
    /// A recognized but unsupported feature was requested (encryption, unknown method, etc).
    UnsupportedFeature(&'static str),
    /// The reader has already been closed.
    Closed,
    /// An invalid argument was passed to an API (e.g. an out-of-bounds read slice).
    InvalidArgument(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Truncated(ctx) => write!(f, "truncated archive: {}", ctx),
            Error::Malformed(msg) => write!(f, "malformed archive: {}", msg),
            Error::UnsupportedFeature(what) => write!(f, "unsupported feature: {}", what),
            Error::Closed => write!(f, "reader is closed"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
