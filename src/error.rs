//! Error types
//!
//! Only a handful of conditions are errors here. Lifecycle races (publishing
//! after stop, double subscribe, starting a running task) are silent no-ops,
//! and a short payload is simply left unclassified. What remains is the
//! source collaborator failing, the decoder collaborator failing, and the OS
//! refusing to give us a thread.

use std::fmt;
use std::io;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Source (demuxer) collaborator failure
    Source(SourceError),
    /// Decoder collaborator failure
    Decode(DecodeError),
    /// I/O error (thread spawn)
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Source(e) => write!(f, "Source error: {}", e),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Source(e) => Some(e),
            Error::Decode(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<SourceError> for Error {
    fn from(e: SourceError) -> Self {
        Error::Source(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Errors reported by a packet source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The resource could not be opened
    Open { uri: String, reason: String },
    /// Opened, but neither a video nor an audio stream was found
    NoStreams,
    /// Reading the next unit failed
    Read(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Open { uri, reason } => write!(f, "Cannot open {}: {}", uri, reason),
            SourceError::NoStreams => write!(f, "No video or audio stream found"),
            SourceError::Read(msg) => write!(f, "Read failed: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// Errors reported by a video decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `decode` called before a successful `open`
    NotOpen,
    /// Codec rejected the input
    Codec(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotOpen => write!(f, "Decoder is not open"),
            DecodeError::Codec(msg) => write!(f, "Codec error: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}
