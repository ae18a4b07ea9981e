//! On-disk structures: the channel directory and the linked sample buffers.
//!
//! An archive is a directory file plus any number of data files in the
//! same directory:
//!
//! ```text
//! directory file                     data files (one per partition)
//! ┌──────────────────────┐           ┌────────────────────────────────┐
//! │ bucket heads [1009]  │           │ CtrlInfo │ DataHeader │ samples │
//! ├──────────────────────┤  first/   │ ...      │ DataHeader │ samples │──┐
//! │ channel record       │──last────▶│          │     ▲      │         │  │ next_file /
//! │ channel record       │  buffer   └────────────────┼───────────────┘  │ next_offset
//! │ ...                  │                            │ prev              │
//! └──────────────────────┘           ┌────────────────┴───────────────┐  │
//!                                    │ DataHeader │ samples  ...      │◀─┘
//!                                    └────────────────────────────────┘
//! ```
//!
//! Offsets are absolute byte positions within one file. Links between
//! buffers name the target file by basename, relative to the directory of
//! the file that holds the link.

pub mod buffer;
pub mod directory;
pub mod file;
pub mod header;

pub use buffer::BufferCursor;
pub use directory::{DirectoryEntry, DirectoryFile, HASH_TABLE_SIZE};
pub use file::{DataFile, FileRegistry};
pub use header::{DataHeader, BUFFER_MARKER, DATA_HEADER_SIZE, MAX_SAMPLES_PER_HEADER};

/// Absolute byte position inside an archive file.
pub type FileOffset = u32;

/// Marks an unset offset.
pub const INVALID_OFFSET: FileOffset = 0xffff_ffff;

/// Size of a file name field in headers and channel records.
pub const FILENAME_LENGTH: usize = 40;

/// How archive files are opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read-only access; files must exist.
    #[default]
    Read,
    /// Read-write access; missing files are created.
    Write,
}

impl OpenMode {
    /// Returns true for [`OpenMode::Write`].
    pub fn is_write(self) -> bool {
        self == Self::Write
    }
}
