//! Channel handle: time lookups and the append protocol.
//!
//! Writing goes through three steps:
//!
//! 1. [`Channel::lock_buffer`] attaches the last buffer and reports how many
//!    more samples of that shape it can take.
//! 2. If that is 0, [`Channel::add_buffer`] allocates and links a new one.
//! 3. [`Channel::add_value`] appends samples until it returns false, at
//!    which point the buffer is released and step 2 repeats.

use super::Session;
use crate::codec::{CtrlInfo, DbrCount, Sample};
use crate::cursor::Cursor;
use crate::error::{ArchiveError, Result};
use crate::iter::ValueIterator;
use crate::storage::{BufferCursor, DataHeader, DirectoryEntry, FileOffset, OpenMode};
use crate::time::EpicsTime;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};

/// One channel of an archive.
#[derive(Debug, Clone)]
pub struct Channel {
    session: Rc<Session>,
    entry: DirectoryEntry,
    append: Option<BufferCursor>,
}

impl Channel {
    pub(crate) fn new(session: Rc<Session>, entry: DirectoryEntry) -> Self {
        Self {
            session,
            entry,
            append: None,
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// When the channel was added.
    pub fn create_time(&self) -> EpicsTime {
        self.entry.create_time
    }

    /// Time of the first sample.
    pub fn first_time(&self) -> EpicsTime {
        self.entry.first_save_time
    }

    /// Time of the last sample.
    pub fn last_time(&self) -> EpicsTime {
        self.entry.last_save_time
    }

    /// Data file basename of the first buffer, empty without data.
    pub fn first_file(&self) -> &str {
        &self.entry.first_file
    }

    /// Header offset of the first buffer.
    pub fn first_offset(&self) -> FileOffset {
        self.entry.first_offset
    }

    /// Data file basename of the last buffer, empty without data.
    pub fn last_file(&self) -> &str {
        &self.entry.last_file
    }

    /// Header offset of the last buffer.
    pub fn last_offset(&self) -> FileOffset {
        self.entry.last_offset
    }

    /// Directory holding the archive this channel belongs to.
    pub fn dirname(&self) -> &Path {
        &self.session.dirname
    }

    /// Directory record of this channel.
    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    /// Rereads the directory record, picking up appends made elsewhere.
    pub fn reload(&mut self) -> Result<()> {
        self.entry = self.session.directory.borrow_mut().reload(&self.entry)?;
        Ok(())
    }

    /// Positions `cursor` on the first sample.
    pub fn first_value(&self, cursor: &mut Cursor) -> Result<bool> {
        if self.entry.first_file.is_empty() {
            cursor.clear();
            return Ok(false);
        }
        let path = self.session.full_file_name(&self.entry.first_file);
        cursor.attach(&path, self.entry.first_offset, false)
    }

    /// Positions `cursor` on the last sample.
    pub fn last_value(&self, cursor: &mut Cursor) -> Result<bool> {
        if self.entry.last_file.is_empty() {
            cursor.clear();
            return Ok(false);
        }
        let path = self.session.full_file_name(&self.entry.last_file);
        cursor.attach(&path, self.entry.last_offset, true)
    }

    /// Positions `cursor` on the first sample at or after `time`.
    ///
    /// A null `time` means the first sample.
    pub fn value_after_time(&self, time: EpicsTime, cursor: &mut Cursor) -> Result<bool> {
        if time.is_null() || time <= self.first_time() {
            return self.first_value(cursor);
        }
        if time > self.last_time() || self.entry.last_file.is_empty() {
            cursor.clear();
            return Ok(false);
        }

        let from_start = time.diff_secs(self.first_time());
        let from_end = self.last_time().diff_secs(time);
        let mut found = false;
        if from_start < from_end && !self.entry.first_file.is_empty() {
            match self.seek_forward(time, cursor) {
                Ok(ok) => found = ok,
                Err(e) => warn!("value_after_time: scan of '{}' from start failed: {}", self.name(), e),
            }
        }
        if !found {
            let path = self.session.full_file_name(&self.entry.last_file);
            if !cursor.seek_buffer(&path, self.entry.last_offset, true)? {
                return Ok(false);
            }
            while cursor.header().map_or(false, |h| h.begin_time > time) {
                if !cursor.retreat_buffer()? {
                    // Nothing earlier, take the first sample we have
                    return cursor.next();
                }
            }
        }

        // Header end times are unreliable in old archives, so scan linearly
        cursor.next()?;
        while cursor.value().map_or(false, |v| v.time < time) {
            cursor.next()?;
        }
        Ok(cursor.is_valid())
    }

    fn seek_forward(&self, time: EpicsTime, cursor: &mut Cursor) -> Result<bool> {
        let path = self.session.full_file_name(&self.entry.first_file);
        if !cursor.seek_buffer(&path, self.entry.first_offset, false)? {
            return Ok(false);
        }
        while cursor.header().map_or(false, |h| h.end_time < time) {
            if !cursor.advance_buffer()? {
                break;
            }
        }
        Ok(true)
    }

    /// Positions `cursor` on the last sample at or before `time`.
    ///
    /// A null `time` means the first sample.
    pub fn value_before_time(&self, time: EpicsTime, cursor: &mut Cursor) -> Result<bool> {
        if time.is_null() {
            return self.first_value(cursor);
        }
        if !self.value_after_time(time, cursor)? {
            return self.last_value(cursor);
        }
        while cursor.value().map_or(false, |v| v.time > time) {
            cursor.prev()?;
        }
        Ok(cursor.is_valid())
    }

    /// Positions `cursor` on the sample closest to `time`. Ties go to the
    /// earlier sample.
    pub fn value_near_time(&self, time: EpicsTime, cursor: &mut Cursor) -> Result<bool> {
        if !self.value_before_time(time, cursor)? {
            return self.value_after_time(time, cursor);
        }
        let before = distance(cursor, time);
        if !cursor.next()? {
            cursor.prev()?;
            return Ok(cursor.is_valid());
        }
        let after = distance(cursor, time);
        if before <= after {
            cursor.prev()?;
        }
        Ok(cursor.is_valid())
    }

    /// Attaches the last buffer for appending samples shaped like `sample`.
    ///
    /// Returns how many more such samples fit, 0 if a new buffer is needed
    /// because the buffer is full, has another shape, or `sample` belongs
    /// to the next data file.
    pub fn lock_buffer(&mut self, sample: &Sample, _period: f64) -> Result<usize> {
        if self.entry.last_file.is_empty() {
            return Ok(0);
        }
        let path = self.session.full_file_name(&self.entry.last_file);
        let mut buffer = BufferCursor::new(self.session.registry.clone());
        buffer.open(&path, self.entry.last_offset, OpenMode::Write)?;
        let free = buffer
            .header()
            .filter(|h| {
                h.dbr_type == sample.dbr_type()
                    && h.count == sample.count()
                    && h.next_file_time > sample.time
            })
            .map_or(0, |h| h.buf_free as usize / h.sample_size());
        self.append = Some(buffer);
        Ok(free)
    }

    /// Allocates a buffer for `count` samples shaped like `sample` and
    /// links it after the last buffer.
    pub fn add_buffer(&mut self, sample: &Sample, info: &CtrlInfo, period: f64, count: usize) -> Result<()> {
        self.check_count(sample)?;
        if !info.is_valid() {
            return Err(ArchiveError::invalid(format!(
                "add_buffer for '{}' without valid CtrlInfo",
                self.name()
            )));
        }
        let partitioning = self.session.config.partitioning;
        let data_file_name = partitioning.data_file_name(sample.time);

        let mut header = DataHeader::new(sample.dbr_type(), sample.count(), period);
        header.dir_offset = self.entry.offset();
        header.buf_free = u32::try_from(count * sample.raw_size())
            .ok()
            .filter(|free| *free <= u32::MAX - DataHeader::SIZE as u32)
            .ok_or_else(|| ArchiveError::invalid(format!("Buffer for {} samples too big", count)))?;
        header.buf_size = header.buf_free + DataHeader::SIZE as u32;
        header.next_file_time = partitioning.next_file_time(sample.time);

        let registry = self.session.registry.clone();
        let mut previous = if self.entry.last_file.is_empty() {
            None
        } else {
            let mut prev = BufferCursor::new(registry.clone());
            let path = self.session.full_file_name(&self.entry.last_file);
            prev.open(&path, self.entry.last_offset, OpenMode::Write)?;
            Some(prev)
        };

        let path = self.session.full_file_name(&data_file_name);
        let file = registry.open(&path, OpenMode::Write)?;
        let buffer = BufferCursor::create(file, registry, header, info, previous.as_mut())?;

        if self.entry.first_file.is_empty() {
            self.entry.first_file = data_file_name.clone();
            self.entry.first_offset = buffer.offset();
        }
        self.entry.last_file = data_file_name;
        self.entry.last_offset = buffer.offset();
        self.session.directory.borrow_mut().save(&self.entry)?;
        debug!(
            "Channel '{}' has new buffer {} @ 0x{:X}",
            self.name(),
            self.entry.last_file,
            self.entry.last_offset
        );
        self.append = Some(buffer);
        Ok(())
    }

    /// Appends `sample` to the locked buffer.
    ///
    /// Returns false without a locked buffer, or when the buffer is full;
    /// the buffer is then released.
    pub fn add_value(&mut self, sample: &Sample) -> Result<bool> {
        self.check_count(sample)?;
        let Some(buffer) = self.append.as_mut() else {
            return Ok(false);
        };
        let is_first = buffer.header().map_or(false, |h| h.num_samples == 0);
        if !buffer.append_sample(sample, true)? {
            self.release_buffer();
            return Ok(false);
        }
        if is_first
            && buffer.basename() == Some(self.entry.first_file.as_str())
            && buffer.offset() == self.entry.first_offset
        {
            self.entry.first_save_time = sample.time;
        }
        self.entry.last_save_time = sample.time;
        self.session.directory.borrow_mut().save(&self.entry)?;
        Ok(true)
    }

    /// Drops the append buffer.
    pub fn release_buffer(&mut self) {
        self.append = None;
    }

    /// Headers store the element count as u16.
    fn check_count(&self, sample: &Sample) -> Result<()> {
        if sample.data.len() > DbrCount::MAX as usize {
            return Err(ArchiveError::invalid(format!(
                "Sample for '{}' has {} elements, at most {} fit",
                self.name(),
                sample.data.len(),
                DbrCount::MAX
            )));
        }
        Ok(())
    }
}

fn distance(cursor: &Cursor, time: EpicsTime) -> f64 {
    cursor
        .value()
        .map_or(f64::INFINITY, |v| v.time.diff_secs(time).abs())
}
