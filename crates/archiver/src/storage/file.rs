//! Data files and the per-session handle registry.
//!
//! A [`FileRegistry`] hands out shared [`DataFile`] handles keyed by path.
//! It only keeps weak references, so the OS file is closed as soon as the
//! last cursor or buffer using it goes away, on every exit path.

use super::header::{DataHeader, BUFFER_MARKER};
use super::{FileOffset, OpenMode};
use crate::codec::{CtrlInfo, Sample};
use crate::error::{ArchiveError, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use tracing::debug;

/// One open data file.
#[derive(Debug)]
pub struct DataFile {
    path: PathBuf,
    dirname: PathBuf,
    basename: String,
    mode: Cell<OpenMode>,
    file: RefCell<File>,
}

impl DataFile {
    fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let file = Self::open_file(path, mode)?;
        debug!("Opened data file {} ({:?})", path.display(), mode);
        Ok(Self {
            path: path.to_path_buf(),
            dirname: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            basename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mode: Cell::new(mode),
            file: RefCell::new(file),
        })
    }

    fn open_file(path: &Path, mode: OpenMode) -> Result<File> {
        match mode {
            OpenMode::Read => File::open(path).map_err(|source| ArchiveError::Open {
                path: path.display().to_string(),
                source,
            }),
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|source| ArchiveError::Create {
                    path: path.display().to_string(),
                    source,
                }),
        }
    }

    /// Full path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the file.
    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    /// File name without directory, as stored in buffer links.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Current access mode.
    pub fn mode(&self) -> OpenMode {
        self.mode.get()
    }

    /// Closes and reopens the file, picking up data another process
    /// appended in the meantime.
    pub fn reopen(&self) -> Result<()> {
        let file = Self::open_file(&self.path, self.mode.get())?;
        *self.file.borrow_mut() = file;
        debug!("Reopened data file {}", self.path.display());
        Ok(())
    }

    fn upgrade_to_write(&self) -> Result<()> {
        self.mode.set(OpenMode::Write);
        self.reopen()
    }

    /// Current file length.
    pub fn len(&self) -> Result<u64> {
        let file = self.file.borrow();
        Ok(file.metadata()?.len())
    }

    /// Returns true for a zero-length file.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads exactly `buf.len()` bytes at `offset`.
    pub fn read_at(&self, offset: FileOffset, buf: &mut [u8], what: &str) -> Result<()> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset as u64))
            .and_then(|_| file.read_exact(buf))
            .map_err(|e| self.read_error(what, offset, e))
    }

    /// Writes `bytes` at `offset`.
    pub fn write_at(&self, offset: FileOffset, bytes: &[u8], what: &str) -> Result<()> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset as u64))
            .and_then(|_| file.write_all(bytes))
            .map_err(|e| self.write_error(what, offset, e))
    }

    /// Appends `bytes` at the end of the file, returning their offset.
    pub fn append(&self, bytes: &[u8], what: &str) -> Result<FileOffset> {
        let mut file = self.file.borrow_mut();
        let end = file
            .seek(SeekFrom::End(0))
            .map_err(|e| ArchiveError::write(format!("{} in {}", what, self.path.display()), e))?;
        let offset = FileOffset::try_from(end).map_err(|_| {
            ArchiveError::invalid(format!("{} exceeds 4 GiB", self.path.display()))
        })?;
        file.write_all(bytes)
            .map_err(|e| self.write_error(what, offset, e))?;
        Ok(offset)
    }

    /// Reads the buffer header at `offset`.
    pub fn read_header(&self, offset: FileOffset) -> Result<DataHeader> {
        let mut bytes = [0u8; DataHeader::SIZE];
        self.read_at(offset, &mut bytes, "DataHeader")?;
        DataHeader::decode(&bytes)
    }

    /// Rewrites the buffer header at `offset`.
    pub fn write_header(&self, offset: FileOffset, header: &DataHeader) -> Result<()> {
        self.write_at(offset, &header.encode(), "DataHeader")
    }

    /// Appends `header` and reserves its data area, which ends in the
    /// buffer marker. Returns the header offset.
    pub fn add_header(&self, header: &DataHeader) -> Result<FileOffset> {
        let offset = self.append(&header.encode(), "DataHeader")?;
        let marker_offset = offset
            .checked_add(header.buf_size)
            .and_then(|end| end.checked_sub(4))
            .ok_or_else(|| ArchiveError::invalid(format!("Bad buffer size {}", header.buf_size)))?;
        self.write_at(marker_offset, &BUFFER_MARKER.to_be_bytes(), "buffer marker")?;
        Ok(offset)
    }

    /// Reads the CtrlInfo block at `offset`. See [`CtrlInfo::read_from`]
    /// for the role of `current`.
    pub fn read_ctrl_info(&self, offset: FileOffset, current: &CtrlInfo) -> Result<CtrlInfo> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(|e| self.read_error("CtrlInfo", offset, e))?;
        CtrlInfo::read_from(&mut *file, current)
    }

    /// Appends a CtrlInfo block, returning its offset.
    pub fn add_ctrl_info(&self, info: &CtrlInfo) -> Result<FileOffset> {
        let bytes = info.encode()?;
        self.append(&bytes, "CtrlInfo")
    }

    /// Reads sample `index` of the buffer whose header is at `header_offset`.
    pub fn read_sample(&self, header_offset: FileOffset, header: &DataHeader, index: usize) -> Result<Sample> {
        let size = header.sample_size();
        let offset = header_offset as u64 + DataHeader::SIZE as u64 + (index * size) as u64;
        let offset = FileOffset::try_from(offset)
            .map_err(|_| ArchiveError::invalid(format!("Sample offset {} out of range", offset)))?;
        let mut bytes = vec![0u8; size];
        self.read_at(offset, &mut bytes, "sample")?;
        Sample::decode(&bytes, header.dbr_type, header.count)
    }

    /// Flushes written data to the OS.
    pub fn flush(&self) -> Result<()> {
        self.file
            .borrow_mut()
            .flush()
            .map_err(|e| ArchiveError::write(format!("flush {}", self.path.display()), e))
    }

    fn read_error(&self, what: &str, offset: FileOffset, e: std::io::Error) -> ArchiveError {
        ArchiveError::read(format!("{} @ 0x{:X} in {}", what, offset, self.path.display()), e)
    }

    fn write_error(&self, what: &str, offset: FileOffset, e: std::io::Error) -> ArchiveError {
        ArchiveError::write(format!("{} @ 0x{:X} in {}", what, offset, self.path.display()), e)
    }
}

/// Shared data file handles of one archive session.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: RefCell<HashMap<PathBuf, Weak<DataFile>>>,
}

impl FileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared handle for `path`, opening it if needed.
    ///
    /// A handle that is open read-only is reopened for writing when
    /// `mode` asks for it; every holder sees the upgraded handle.
    pub fn open(&self, path: &Path, mode: OpenMode) -> Result<Rc<DataFile>> {
        let mut files = self.files.borrow_mut();
        if let Some(file) = files.get(path).and_then(Weak::upgrade) {
            if mode.is_write() && !file.mode().is_write() {
                file.upgrade_to_write()?;
            }
            return Ok(file);
        }
        let file = Rc::new(DataFile::open(path, mode)?);
        files.retain(|_, weak| weak.strong_count() > 0);
        files.insert(path.to_path_buf(), Rc::downgrade(&file));
        Ok(file)
    }

    /// Number of files currently held open.
    pub fn open_count(&self) -> usize {
        self.files
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
