//! Raw sample cursor over a channel's buffer chain.
//!
//! The cursor keeps one buffer header and an index into its samples. Buffers
//! with a negative period or unreadable CtrlInfo are skipped with a warning,
//! as old archives contain both. When the cursor runs off the end of the
//! last buffer it rereads that header once, so a reader can follow a
//! writer in another process.

use crate::archive::FilePartitioning;
use crate::codec::{CtrlInfo, Sample};
use crate::error::Result;
use crate::iter::ValueIterator;
use crate::storage::{BufferCursor, DataHeader, FileOffset, FileRegistry, OpenMode, INVALID_OFFSET, MAX_SAMPLES_PER_HEADER};
use crate::time::EpicsTime;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::warn;

/// Position of a [`Cursor`] within its current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Before the first sample of the buffer.
    BeforeStart,
    /// On sample `n` of the buffer.
    At(usize),
    /// After the last sample of the buffer.
    AfterEnd,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// Iterates the raw samples of one channel.
#[derive(Debug, Clone)]
pub struct Cursor {
    buffer: BufferCursor,
    position: Position,
    sample: Option<Sample>,
    ctrl_info: CtrlInfo,
    ctrl_info_offset: FileOffset,
    ctrl_info_file: Option<PathBuf>,
    partitioning: FilePartitioning,
}

impl Cursor {
    /// Creates an unpositioned cursor.
    pub fn new(registry: Rc<FileRegistry>, partitioning: FilePartitioning) -> Self {
        Self {
            buffer: BufferCursor::new(registry),
            position: Position::AfterEnd,
            sample: None,
            ctrl_info: CtrlInfo::Invalid,
            ctrl_info_offset: INVALID_OFFSET,
            ctrl_info_file: None,
            partitioning,
        }
    }

    /// Positions on the first sample of the buffer at `offset` in `path`,
    /// or on its last sample when `from_end` is set. Empty and broken
    /// buffers are skipped in the direction of travel.
    pub fn attach(&mut self, path: &Path, offset: FileOffset, from_end: bool) -> Result<bool> {
        self.clear();
        self.buffer.open(path, offset, OpenMode::Read)?;
        let usable = self.enter_buffer()?;
        if usable {
            let num = self.num_samples();
            if num > 0 {
                self.read(if from_end { num - 1 } else { 0 })?;
                return Ok(true);
            }
        }
        let found = if from_end {
            self.prev_buffer()?
        } else {
            self.next_buffer()?
        };
        if !found && !usable {
            // Only the skipped buffer is left
            self.clear();
        }
        Ok(found)
    }

    /// Positions before the first sample of the buffer at `offset` without
    /// reading a sample. A broken buffer is skipped in the direction given
    /// by `from_end`.
    pub fn seek_buffer(&mut self, path: &Path, offset: FileOffset, from_end: bool) -> Result<bool> {
        self.clear();
        self.buffer.open(path, offset, OpenMode::Read)?;
        if self.enter_buffer()? {
            self.position = Position::BeforeStart;
            return Ok(true);
        }
        let found = if from_end {
            self.retreat_buffer()?
        } else {
            self.advance_buffer()?
        };
        if !found {
            self.clear();
        }
        Ok(found)
    }

    /// Drops buffer, sample and CtrlInfo.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.position = Position::AfterEnd;
        self.sample = None;
        self.ctrl_info = CtrlInfo::Invalid;
        self.ctrl_info_offset = INVALID_OFFSET;
        self.ctrl_info_file = None;
    }

    /// Position within the current buffer.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Header of the current buffer.
    pub fn header(&self) -> Option<&DataHeader> {
        self.buffer.header()
    }

    /// Partitioning used to bound chunks.
    pub fn partitioning(&self) -> FilePartitioning {
        self.partitioning
    }

    /// Moves to the first sample of the next non-empty buffer.
    pub fn next_buffer(&mut self) -> Result<bool> {
        if self.switch_buffer(Direction::Forward, true)? {
            self.read(0)?;
            return Ok(true);
        }
        self.position = Position::AfterEnd;
        self.sample = None;
        Ok(false)
    }

    /// Moves to the last sample of the previous non-empty buffer.
    pub fn prev_buffer(&mut self) -> Result<bool> {
        if self.switch_buffer(Direction::Backward, true)? {
            let last = self.num_samples() - 1;
            self.read(last)?;
            return Ok(true);
        }
        self.position = Position::BeforeStart;
        self.sample = None;
        Ok(false)
    }

    /// Steps forward one usable buffer without reading a sample, for time
    /// searches that only look at header times.
    pub fn advance_buffer(&mut self) -> Result<bool> {
        self.switch_buffer(Direction::Forward, false)
    }

    /// Steps back one usable buffer without reading a sample.
    pub fn retreat_buffer(&mut self) -> Result<bool> {
        self.switch_buffer(Direction::Backward, false)
    }

    /// Follows buffer links until a usable buffer is found. If there is
    /// none the cursor stays on the buffer it started from, which callers
    /// that started on a skipped buffer must drop.
    fn switch_buffer(&mut self, direction: Direction, need_samples: bool) -> Result<bool> {
        let saved = (
            self.buffer.clone(),
            self.ctrl_info.clone(),
            self.ctrl_info_offset,
            self.ctrl_info_file.clone(),
        );
        loop {
            let moved = match direction {
                Direction::Forward if self.buffer.has_next() => self.buffer.advance()?,
                Direction::Backward if self.buffer.has_prev() => self.buffer.retreat()?,
                _ => false,
            };
            if !moved {
                break;
            }
            if self.enter_buffer()? && (!need_samples || self.num_samples() > 0) {
                if !need_samples {
                    self.position = Position::BeforeStart;
                    self.sample = None;
                }
                return Ok(true);
            }
        }
        (self.buffer, self.ctrl_info, self.ctrl_info_offset, self.ctrl_info_file) = saved;
        Ok(false)
    }

    fn buffer_id(&self) -> (Option<&Path>, FileOffset) {
        (self.buffer.file_name(), self.buffer.offset())
    }

    fn num_samples(&self) -> usize {
        self.buffer.header().map_or(0, |h| h.num_samples as usize)
    }

    fn read(&mut self, index: usize) -> Result<()> {
        let sample = self.buffer.read_sample(index)?;
        self.sample = Some(sample);
        self.position = Position::At(index);
        Ok(())
    }

    /// Loads the CtrlInfo of a buffer just switched to. Returns false for
    /// buffers that must be skipped.
    fn enter_buffer(&mut self) -> Result<bool> {
        let Some(header) = self.buffer.header() else {
            return Ok(false);
        };
        let config_offset = header.config_offset;
        if header.period < 0.0 {
            warn!(
                "Skipping buffer with bad period {} in {:?} @ 0x{:X}",
                header.period,
                self.buffer.file_name(),
                self.buffer.offset()
            );
            return Ok(false);
        }
        let file = self.buffer.file_name().map(Path::to_path_buf);
        if config_offset == self.ctrl_info_offset && file == self.ctrl_info_file {
            return Ok(true);
        }
        match self.buffer.read_ctrl_info(&self.ctrl_info) {
            Ok(info) => {
                self.ctrl_info = info;
                self.ctrl_info_offset = config_offset;
                self.ctrl_info_file = file;
                Ok(true)
            }
            Err(e) if e.is_invalid() => {
                if !self.ctrl_info.is_valid() {
                    warn!(
                        "Skipping buffer with bad CtrlInfo in {:?} @ 0x{:X}: {}",
                        file,
                        self.buffer.offset(),
                        e
                    );
                    self.ctrl_info_offset = INVALID_OFFSET;
                    return Ok(false);
                }
                warn!("Ignoring CtrlInfo error in {:?}, keeping current one: {}", file, e);
                self.ctrl_info_offset = config_offset;
                self.ctrl_info_file = file;
                Ok(true)
            }
            Err(e) => {
                self.ctrl_info_offset = INVALID_OFFSET;
                Err(e)
            }
        }
    }
}

impl ValueIterator for Cursor {
    fn is_valid(&self) -> bool {
        matches!(self.position, Position::At(_)) && self.sample.is_some()
    }

    fn value(&self) -> Option<&Sample> {
        self.sample.as_ref()
    }

    fn ctrl_info(&self) -> Option<&CtrlInfo> {
        self.sample.as_ref().map(|_| &self.ctrl_info)
    }

    fn period(&self) -> f64 {
        self.buffer.header().map_or(0.0, |h| h.period)
    }

    fn next(&mut self) -> Result<bool> {
        if !self.buffer.is_valid() {
            return Ok(false);
        }
        let index = match self.position {
            Position::BeforeStart => 0,
            Position::At(i) => i + 1,
            Position::AfterEnd => self.num_samples(),
        };
        if index < self.num_samples() {
            self.read(index)?;
            return Ok(true);
        }
        if !self.buffer.has_next() {
            // Last buffer, maybe still being written
            self.buffer.sync()?;
            if index < self.num_samples() {
                self.read(index)?;
                return Ok(true);
            }
        }
        self.next_buffer()
    }

    fn prev(&mut self) -> Result<bool> {
        if !self.buffer.is_valid() {
            return Ok(false);
        }
        let index = match self.position {
            Position::BeforeStart => None,
            Position::At(i) => i.checked_sub(1),
            Position::AfterEnd => self.num_samples().checked_sub(1),
        };
        if let Some(index) = index {
            self.read(index)?;
            return Ok(true);
        }
        self.prev_buffer()
    }

    fn determine_chunk(&self, until: Option<EpicsTime>) -> Result<usize> {
        let Some(first) = self.sample.as_ref().filter(|_| self.is_valid()) else {
            return Ok(0);
        };
        let info = self.ctrl_info.clone();
        let period = self.period();
        let next_file_time = self.partitioning.next_file_time(first.time);

        let start = self.buffer_id();
        let mut scan = self.clone();
        let mut count = 0;
        while let Some(sample) = scan.sample.as_ref().filter(|_| scan.is_valid()) {
            if until.map_or(false, |u| sample.time >= u) {
                break;
            }
            if !next_file_time.is_null() && sample.time >= next_file_time {
                break;
            }
            if scan.ctrl_info != info || scan.period() != period {
                break;
            }
            count += 1;
            if count >= MAX_SAMPLES_PER_HEADER {
                break;
            }
            if let Err(e) = scan.next() {
                warn!("determine_chunk: {}", e);
                break;
            }
            if scan.buffer_id() != start {
                break;
            }
        }
        Ok(count)
    }
}
