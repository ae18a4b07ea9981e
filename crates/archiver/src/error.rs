//! Error and Result types for archive operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// The error type for archive operations.
///
/// The four I/O variants are fatal to the operation that raised them.
/// `Invalid` covers structural or logical violations; the cursor layer
/// recovers from some of them (bad control metadata) by skipping a buffer.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Seek or read failed on an archive file.
    #[error("Read error: {context}: {source}")]
    Read {
        /// What was being read.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Seek or write failed on an archive file.
    #[error("Write error: {context}: {source}")]
    Write {
        /// What was being written.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An existing file could not be opened.
    #[error("Cannot open {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A file could not be created for writing.
    #[error("Cannot create {path}: {source}")]
    Create {
        /// Path that failed to be created.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Structural or logical violation (bad control metadata, wrong value
    /// type for the operation, unsupported traversal direction, ...).
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Operation not meaningful for this data shape.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Underlying I/O error outside of a read/write/open context.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Channel name pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ArchiveError {
    /// Builds a [`ArchiveError::Read`] from an I/O error.
    pub fn read(context: impl Into<String>, source: io::Error) -> Self {
        Self::Read {
            context: context.into(),
            source,
        }
    }

    /// Builds a [`ArchiveError::Write`] from an I/O error.
    pub fn write(context: impl Into<String>, source: io::Error) -> Self {
        Self::Write {
            context: context.into(),
            source,
        }
    }

    /// Builds an [`ArchiveError::Invalid`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Returns true for the `Invalid` class.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}
