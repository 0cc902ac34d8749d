//! Error types for the two conditions the core can report to a host:
//! a rejected disk image and a rejected state snapshot. Runtime access never
//! fails (spec §7) so there is no general-purpose error enum here.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// Extension/byte-length combination does not match any recognized layout.
    UnrecognizedLayout { ext: String, len: usize },
    /// Container parsed but declared a format we don't handle.
    UnsupportedFormat(String),
    /// Malformed container (bad header, truncated chunk, etc).
    Malformed(&'static str),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::UnrecognizedLayout { ext, len } => {
                write!(f, "unrecognized image layout: ext={ext} len={len}")
            }
            ImageError::UnsupportedFormat(s) => write!(f, "unsupported format: {s}"),
            ImageError::Malformed(s) => write!(f, "malformed image: {s}"),
        }
    }
}

impl std::error::Error for ImageError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    VersionMismatch { expected: u32, found: u32 },
    Truncated(&'static str),
    Deserialize(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::VersionMismatch { expected, found } => {
                write!(f, "state version mismatch: expected {expected}, found {found}")
            }
            StateError::Truncated(s) => write!(f, "truncated state: {s}"),
            StateError::Deserialize(s) => write!(f, "state deserialize failed: {s}"),
        }
    }
}

impl std::error::Error for StateError {}
