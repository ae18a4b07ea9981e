//! Navigation and appending along a channel's chain of buffers.

use super::file::{DataFile, FileRegistry};
use super::header::DataHeader;
use super::{FileOffset, OpenMode, INVALID_OFFSET};
use crate::codec::{CtrlInfo, Sample};
use crate::error::{ArchiveError, Result};
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

/// Points at one buffer header and follows its links.
///
/// Links may cross data files; the target is opened through the
/// session's [`FileRegistry`] with the mode of the current file.
#[derive(Debug, Clone)]
pub struct BufferCursor {
    registry: Rc<FileRegistry>,
    file: Option<Rc<DataFile>>,
    offset: FileOffset,
    header: Option<DataHeader>,
}

impl BufferCursor {
    /// Creates a cursor that points nowhere.
    pub fn new(registry: Rc<FileRegistry>) -> Self {
        Self {
            registry,
            file: None,
            offset: INVALID_OFFSET,
            header: None,
        }
    }

    /// Opens `path` and reads the header at `offset`.
    pub fn open(&mut self, path: &Path, offset: FileOffset, mode: OpenMode) -> Result<()> {
        let file = self.registry.open(path, mode)?;
        self.attach(file, offset)
    }

    /// Reads the header at `offset` of `file`.
    pub fn attach(&mut self, file: Rc<DataFile>, offset: FileOffset) -> Result<()> {
        self.clear();
        let header = file.read_header(offset)?;
        self.file = Some(file);
        self.offset = offset;
        self.header = Some(header);
        Ok(())
    }

    /// Releases the file and header.
    pub fn clear(&mut self) {
        self.file = None;
        self.offset = INVALID_OFFSET;
        self.header = None;
    }

    /// Returns true while pointing at a header.
    pub fn is_valid(&self) -> bool {
        self.header.is_some()
    }

    /// Current header.
    pub fn header(&self) -> Option<&DataHeader> {
        self.header.as_ref()
    }

    /// Current header, for modification before [`BufferCursor::save`].
    pub fn header_mut(&mut self) -> Option<&mut DataHeader> {
        self.header.as_mut()
    }

    /// Header offset.
    pub fn offset(&self) -> FileOffset {
        self.offset
    }

    /// Offset of the first sample byte.
    pub fn data_offset(&self) -> Result<FileOffset> {
        if self.header.is_none() {
            return Err(ArchiveError::invalid("BufferCursor is not attached"));
        }
        Ok(self.offset + DataHeader::SIZE as FileOffset)
    }

    /// Current data file.
    pub fn file(&self) -> Option<&Rc<DataFile>> {
        self.file.as_ref()
    }

    /// Full path of the current data file.
    pub fn file_name(&self) -> Option<&Path> {
        self.file.as_deref().map(DataFile::path)
    }

    /// Basename of the current data file.
    pub fn basename(&self) -> Option<&str> {
        self.file.as_deref().map(DataFile::basename)
    }

    /// Returns true if a next buffer is linked.
    pub fn has_next(&self) -> bool {
        self.header.as_ref().map_or(false, DataHeader::has_next)
    }

    /// Returns true if a previous buffer is linked.
    pub fn has_prev(&self) -> bool {
        self.header.as_ref().map_or(false, DataHeader::has_prev)
    }

    /// Moves to the next buffer. Without a link the cursor becomes invalid.
    pub fn advance(&mut self) -> Result<bool> {
        let link = self
            .header
            .as_ref()
            .filter(|h| h.has_next())
            .map(|h| (h.next_file.clone(), h.next_offset));
        self.follow(link)
    }

    /// Moves to the previous buffer. Without a link the cursor becomes invalid.
    pub fn retreat(&mut self) -> Result<bool> {
        let link = self
            .header
            .as_ref()
            .filter(|h| h.has_prev())
            .map(|h| (h.prev_file.clone(), h.prev_offset));
        self.follow(link)
    }

    fn follow(&mut self, link: Option<(String, FileOffset)>) -> Result<bool> {
        let (Some((basename, offset)), Some(current)) = (link, self.file.clone()) else {
            self.clear();
            return Ok(false);
        };
        let file = if basename == current.basename() {
            current
        } else {
            let path = current.dirname().join(&basename);
            self.registry.open(&path, current.mode())?
        };
        self.attach(file, offset)?;
        Ok(true)
    }

    /// Reopens the file and rereads the header, picking up samples that
    /// another process appended.
    pub fn sync(&mut self) -> Result<()> {
        let file = self.attached_file()?;
        file.reopen()?;
        self.header = Some(file.read_header(self.offset)?);
        debug!("Synced header @ 0x{:X} in {}", self.offset, file.path().display());
        Ok(())
    }

    /// Writes the current header back.
    pub fn save(&self) -> Result<()> {
        let file = self.attached_file()?;
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| ArchiveError::invalid("BufferCursor is not attached"))?;
        file.write_header(self.offset, header)
    }

    /// Reads sample `index` of the current buffer.
    pub fn read_sample(&self, index: usize) -> Result<Sample> {
        let file = self.attached_file()?;
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| ArchiveError::invalid("BufferCursor is not attached"))?;
        file.read_sample(self.offset, header, index)
    }

    /// Reads the CtrlInfo of the current buffer.
    pub fn read_ctrl_info(&self, current: &CtrlInfo) -> Result<CtrlInfo> {
        let file = self.attached_file()?;
        let offset = self
            .header
            .as_ref()
            .map(|h| h.config_offset)
            .ok_or_else(|| ArchiveError::invalid("BufferCursor is not attached"))?;
        file.read_ctrl_info(offset, current)
    }

    /// Creates a new buffer in `file`, linked after `previous` if given.
    ///
    /// `header` supplies shape, capacity and times; the links and the
    /// CtrlInfo offset are filled in here. The CtrlInfo block of
    /// `previous` is reused when it lives in the same file and is equal.
    pub fn create(
        file: Rc<DataFile>,
        registry: Rc<FileRegistry>,
        mut header: DataHeader,
        info: &CtrlInfo,
        previous: Option<&mut BufferCursor>,
    ) -> Result<Self> {
        let mut reuse_config = None;
        match previous.as_deref() {
            Some(prev) if prev.is_valid() => {
                header.prev_file = prev.basename().unwrap_or_default().to_string();
                header.prev_offset = prev.offset;
                if prev.file.as_ref().map_or(false, |f| Rc::ptr_eq(f, &file)) {
                    if let Ok(prev_info) = prev.read_ctrl_info(&CtrlInfo::Invalid) {
                        if prev_info == *info {
                            reuse_config = prev.header.as_ref().map(|h| h.config_offset);
                        }
                    }
                }
            }
            _ => {
                header.prev_file.clear();
                header.prev_offset = 0;
            }
        }
        header.config_offset = match reuse_config {
            Some(offset) => offset,
            None => file.add_ctrl_info(info)?,
        };
        header.next_file.clear();
        header.next_offset = 0;
        let offset = file.add_header(&header)?;
        debug!(
            "Created buffer @ 0x{:X} in {} ({} bytes)",
            offset,
            file.path().display(),
            header.buf_size
        );

        if let Some(prev) = previous.filter(|p| p.is_valid()) {
            if let Some(prev_header) = prev.header.as_mut() {
                prev_header.next_file = file.basename().to_string();
                prev_header.next_offset = offset;
            }
            prev.save()?;
        }

        Ok(Self {
            registry,
            file: Some(file),
            offset,
            header: Some(header),
        })
    }

    /// Appends `sample` to the current buffer.
    ///
    /// Returns `Ok(false)` when the buffer has no room left. The header is
    /// written back for the first sample and whenever `update_header` is set.
    pub fn append_sample(&mut self, sample: &Sample, update_header: bool) -> Result<bool> {
        let data_offset = self.data_offset()?;
        let file = self.attached_file()?;
        let Some(header) = self.header.as_mut() else {
            return Err(ArchiveError::invalid("BufferCursor is not attached"));
        };
        let bytes = sample.encode();
        let size = bytes.len() as u32;
        if size > header.buf_free {
            return Ok(false);
        }
        file.write_at(data_offset + header.curr_offset, &bytes, "sample")?;
        let mut update_header = update_header;
        if header.num_samples == 0 {
            header.begin_time = sample.time;
            update_header = true;
        }
        header.curr_offset += size;
        header.num_samples += 1;
        header.buf_free -= size;
        if update_header {
            header.end_time = sample.time;
            self.save()?;
        }
        Ok(true)
    }

    fn attached_file(&self) -> Result<Rc<DataFile>> {
        self.file
            .clone()
            .ok_or_else(|| ArchiveError::invalid("BufferCursor is not attached"))
    }
}
