//! Archive facade: one directory file plus its data files.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_archiver::archive::{Archive, ArchiveConfig};
//! use alopex_archiver::iter::ValueIterator;
//!
//! let archive = Archive::open("/data/archive/dir", ArchiveConfig::default())?;
//! if let Some(channel) = archive.find_by_name("T1")? {
//!     let mut cursor = archive.new_cursor();
//!     channel.value_after_time(start, &mut cursor)?;
//!     while cursor.is_valid() {
//!         // ...
//!         cursor.next()?;
//!     }
//! }
//! ```

pub mod channel;
pub mod partition;

pub use channel::Channel;
pub use partition::{FilePartitioning, SECS_PER_MONTH};

pub use crate::storage::OpenMode;

use crate::codec::{DbrCount, DbrType, Sample};
use crate::cursor::Cursor;
use crate::error::Result;
use crate::storage::{DirectoryEntry, DirectoryFile, FileRegistry};
use crate::time::EpicsTime;
use regex::Regex;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Configuration for opening an archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveConfig {
    /// Read-only or read-write access.
    pub mode: OpenMode,
    /// Data file layout used when writing.
    pub partitioning: FilePartitioning,
}

impl ArchiveConfig {
    /// Creates a configuration with custom settings.
    pub fn new(mode: OpenMode, partitioning: FilePartitioning) -> Self {
        Self { mode, partitioning }
    }

    /// Read-write configuration with monthly files.
    pub fn for_write() -> Self {
        Self::default().with_mode(OpenMode::Write)
    }

    /// Sets the access mode.
    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the data file layout.
    pub fn with_partitioning(mut self, partitioning: FilePartitioning) -> Self {
        self.partitioning = partitioning;
        self
    }
}

/// State shared by an archive and everything opened from it.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) dirname: PathBuf,
    pub(crate) config: ArchiveConfig,
    pub(crate) directory: RefCell<DirectoryFile>,
    pub(crate) registry: Rc<FileRegistry>,
}

impl Session {
    pub(crate) fn full_file_name(&self, basename: &str) -> PathBuf {
        self.dirname.join(basename)
    }

    pub(crate) fn new_cursor(&self) -> Cursor {
        Cursor::new(self.registry.clone(), self.config.partitioning)
    }
}

/// An open archive.
#[derive(Debug, Clone)]
pub struct Archive {
    session: Rc<Session>,
}

impl Archive {
    /// Opens the archive whose directory file is `path`.
    ///
    /// In write mode a missing directory file is created.
    pub fn open(path: impl AsRef<Path>, config: ArchiveConfig) -> Result<Self> {
        let path = path.as_ref();
        let directory = DirectoryFile::open(path, config.mode)?;
        let dirname = path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!("Opened archive {}", path.display());
        Ok(Self {
            session: Rc::new(Session {
                dirname,
                config,
                directory: RefCell::new(directory),
                registry: Rc::new(FileRegistry::new()),
            }),
        })
    }

    /// Configuration the archive was opened with.
    pub fn config(&self) -> &ArchiveConfig {
        &self.session.config
    }

    /// Directory holding the directory and data files.
    pub fn dirname(&self) -> &Path {
        &self.session.dirname
    }

    /// Data file handles of this session.
    pub fn registry(&self) -> &Rc<FileRegistry> {
        &self.session.registry
    }

    /// Iterator positioned on the first channel.
    pub fn find_first(&self) -> Result<ChannelIter> {
        ChannelIter::start(self.session.clone(), None)
    }

    /// Looks up a channel by exact name.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Channel>> {
        let entry = self.session.directory.borrow_mut().find(name)?;
        Ok(entry.map(|entry| Channel::new(self.session.clone(), entry)))
    }

    /// Iterator over the channels whose name matches `pattern` anywhere.
    /// An empty pattern matches all channels.
    pub fn find_by_pattern(&self, pattern: &str) -> Result<ChannelIter> {
        if pattern.is_empty() {
            return self.find_first();
        }
        ChannelIter::start(self.session.clone(), Some(Regex::new(pattern)?))
    }

    /// Adds a channel, or returns the existing one of that name.
    ///
    /// Check with [`Archive::find_by_name`] first to tell both apart.
    pub fn add_channel(&self, name: &str) -> Result<Channel> {
        let entry = self.session.directory.borrow_mut().add(name)?;
        Ok(Channel::new(self.session.clone(), entry))
    }

    /// Unlinks a channel from the directory. Its data stays on disk.
    pub fn remove_channel(&self, name: &str) -> Result<bool> {
        self.session.directory.borrow_mut().remove(name)
    }

    /// Creates an unpositioned cursor for this archive.
    pub fn new_cursor(&self) -> Cursor {
        self.session.new_cursor()
    }

    /// Data file basename for samples at `time`.
    pub fn data_file_name(&self, time: EpicsTime) -> String {
        self.session.config.partitioning.data_file_name(time)
    }

    /// Time at which samples following `time` go into a new file.
    pub fn next_file_time(&self, time: EpicsTime) -> EpicsTime {
        self.session.config.partitioning.next_file_time(time)
    }

    /// Path of a data file given its basename.
    pub fn full_file_name(&self, basename: &str) -> PathBuf {
        self.session.full_file_name(basename)
    }

    /// Zero-filled sample of the given shape.
    pub fn new_value(&self, dbr_type: DbrType, count: DbrCount) -> Sample {
        Sample::new(dbr_type, count)
    }
}

/// Walks the channels of an archive, optionally filtered by a pattern.
#[derive(Debug)]
pub struct ChannelIter {
    session: Rc<Session>,
    entry: Option<DirectoryEntry>,
    pattern: Option<Regex>,
}

impl ChannelIter {
    fn start(session: Rc<Session>, pattern: Option<Regex>) -> Result<Self> {
        let entry = session.directory.borrow_mut().first()?;
        let mut iter = Self {
            session,
            entry,
            pattern,
        };
        iter.skip_unmatched()?;
        Ok(iter)
    }

    /// Returns true while positioned on a channel.
    pub fn is_valid(&self) -> bool {
        self.entry.is_some()
    }

    /// Current channel.
    pub fn current(&self) -> Option<Channel> {
        self.entry
            .as_ref()
            .map(|entry| Channel::new(self.session.clone(), entry.clone()))
    }

    /// Moves to the next matching channel.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<bool> {
        self.step()?;
        self.skip_unmatched()?;
        Ok(self.is_valid())
    }

    fn step(&mut self) -> Result<()> {
        if let Some(entry) = self.entry.take() {
            self.entry = self.session.directory.borrow_mut().next(&entry)?;
        }
        Ok(())
    }

    fn skip_unmatched(&mut self) -> Result<()> {
        loop {
            let matched = match (&self.entry, &self.pattern) {
                (Some(entry), Some(pattern)) => pattern.is_match(&entry.name),
                _ => true,
            };
            if matched {
                return Ok(());
            }
            self.step()?;
        }
    }
}
