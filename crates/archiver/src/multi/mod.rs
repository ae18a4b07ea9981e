//! Read-only view over several archives listed in a master file.
//!
//! Sub-archives are usually consecutive time slices of one setup, newest
//! first. Lookups route each request to the sub-archive that holds the
//! requested time, and a [`MultiCursor`] continues in the next sub-archive
//! when the current one runs out of samples:
//!
//! ```text
//!   master ──▶ [ B: day 2-3 ] [ A: day 1-2 ]
//!                      ▲             ▲
//!   value_after(day 1 12:00) ────────┘  then next() past A's end ──▶ B
//! ```
//!
//! Sub-archives are opened per request. The per-channel time ranges are
//! collected once, on first use.

pub mod cursor;
mod master;

pub use cursor::MultiCursor;

use crate::archive::{Archive, ArchiveConfig, Channel};
use crate::codec::{CtrlInfo, Sample};
use crate::cursor::Cursor;
use crate::error::{ArchiveError, Result};
use crate::iter::ValueIterator;
use crate::time::EpicsTime;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

const READ_ONLY: &str = "Cannot write, MultiArchive is read-only";

/// Options for opening a [`MultiArchive`].
///
/// The window only matters while the master file is read: sub-archives
/// that end before `from` or start after `to` are left out.
#[derive(Debug, Clone, Default)]
pub struct MultiArchiveConfig {
    /// Start of the time window of interest.
    pub from: Option<EpicsTime>,
    /// End of the time window of interest.
    pub to: Option<EpicsTime>,
}

impl MultiArchiveConfig {
    /// Unbounded window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window start.
    pub fn with_from(mut self, from: EpicsTime) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the window end.
    pub fn with_to(mut self, to: EpicsTime) -> Self {
        self.to = Some(to);
        self
    }

    pub(crate) fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Returns true if data from `start` to `end` touches the window.
    pub(crate) fn overlaps(&self, start: EpicsTime, end: EpicsTime) -> bool {
        self.from.map_or(true, |from| from < end) && self.to.map_or(true, |to| to >= start)
    }
}

/// Time range of one channel across all sub-archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    /// Channel name.
    pub name: String,
    /// Earliest first sample time.
    pub first_time: EpicsTime,
    /// Latest last sample time.
    pub last_time: EpicsTime,
}

#[derive(Debug)]
pub(crate) struct MultiInner {
    archives: Vec<PathBuf>,
    channels: RefCell<Vec<ChannelSummary>>,
    queried: Cell<bool>,
}

impl MultiInner {
    fn open_sub(path: &Path) -> Result<Archive> {
        Archive::open(path, ArchiveConfig::default())
    }

    fn name(&self, index: usize) -> Option<String> {
        self.channels.borrow().get(index).map(|c| c.name.clone())
    }

    fn summary_index(&self, name: &str) -> usize {
        let mut channels = self.channels.borrow_mut();
        if let Some(index) = channels.iter().position(|c| c.name == name) {
            return index;
        }
        channels.push(ChannelSummary {
            name: name.to_string(),
            first_time: EpicsTime::NULL,
            last_time: EpicsTime::NULL,
        });
        channels.len() - 1
    }

    /// Collects the channel list and time ranges of all sub-archives.
    fn query_all_archives(&self) -> Result<()> {
        if self.queried.get() {
            return Ok(());
        }
        for path in &self.archives {
            let archive = Self::open_sub(path)?;
            let mut iter = archive.find_first()?;
            while let Some(channel) = iter.current() {
                let index = self.summary_index(channel.name());
                let mut channels = self.channels.borrow_mut();
                let summary = &mut channels[index];
                let first = channel.first_time();
                if first.is_valid() && (!summary.first_time.is_valid() || summary.first_time > first) {
                    summary.first_time = first;
                }
                let last = channel.last_time();
                if last.is_valid() && summary.last_time < last {
                    summary.last_time = last;
                }
                drop(channels);
                iter.next()?;
            }
        }
        debug!("Queried {} sub-archives", self.archives.len());
        self.queried.set(true);
        Ok(())
    }

    fn summary(&self, index: usize) -> Result<Option<ChannelSummary>> {
        self.query_all_archives()?;
        Ok(self.channels.borrow().get(index).cloned())
    }

    /// First sample at or after `time`. A sub-archive whose range holds
    /// `time` wins over one that starts after it.
    pub(crate) fn value_after_time(&self, index: usize, time: EpicsTime, cursor: &mut MultiCursor) -> Result<bool> {
        let Some(name) = self.name(index) else {
            return Ok(false);
        };
        let mut later = None;
        for path in &self.archives {
            let archive = Self::open_sub(path)?;
            let Some(channel) = archive.find_by_name(&name)? else {
                continue;
            };
            if channel.last_time() < time {
                continue;
            }
            if channel.first_time() >= time {
                // Listed newest first, so the last one seen is the closest
                later = Some((archive, channel));
                continue;
            }
            let mut values = archive.new_cursor();
            if !channel.value_after_time(time, &mut values)? {
                continue;
            }
            cursor.position(index, channel, values);
            return Ok(cursor.is_valid());
        }
        if let Some((archive, channel)) = later {
            let mut values = archive.new_cursor();
            if channel.value_after_time(time, &mut values)? {
                cursor.position(index, channel, values);
                return Ok(cursor.is_valid());
            }
        }
        Ok(false)
    }

    /// Last sample at or before `time` from the first sub-archive that
    /// has one. Without `exact_ok`, sub-archives starting at or after
    /// `time` are ignored.
    pub(crate) fn value_at_or_before_time(
        &self,
        index: usize,
        time: EpicsTime,
        exact_ok: bool,
        cursor: &mut MultiCursor,
    ) -> Result<bool> {
        let Some(name) = self.name(index) else {
            return Ok(false);
        };
        for path in &self.archives {
            let archive = Self::open_sub(path)?;
            let Some(channel) = archive.find_by_name(&name)? else {
                continue;
            };
            if !exact_ok && channel.first_time() >= time {
                continue;
            }
            let mut values = archive.new_cursor();
            if !channel.value_before_time(time, &mut values)? {
                continue;
            }
            cursor.position(index, channel, values);
            return Ok(cursor.is_valid());
        }
        Ok(false)
    }

    /// Sample closest to `time` over all sub-archives. On a tie the one
    /// listed first wins.
    pub(crate) fn value_near_time(&self, index: usize, time: EpicsTime, cursor: &mut MultiCursor) -> Result<bool> {
        let Some(name) = self.name(index) else {
            return Ok(false);
        };
        let mut best: Option<(f64, Channel, Cursor)> = None;
        for path in &self.archives {
            let archive = Self::open_sub(path)?;
            let Some(channel) = archive.find_by_name(&name)? else {
                continue;
            };
            let mut values = archive.new_cursor();
            if !channel.value_near_time(time, &mut values)? {
                continue;
            }
            let Some(distance) = values.value().map(|v| v.time.diff_secs(time).abs()) else {
                continue;
            };
            if best.as_ref().map_or(true, |(d, _, _)| distance < *d) {
                best = Some((distance, channel, values));
            }
        }
        match best {
            Some((_, channel, values)) => {
                cursor.position(index, channel, values);
                Ok(cursor.is_valid())
            }
            None => Ok(false),
        }
    }
}

/// Several archives read as one.
#[derive(Debug, Clone)]
pub struct MultiArchive {
    inner: Rc<MultiInner>,
}

impl MultiArchive {
    /// Opens the master file `master`, or a plain directory file.
    pub fn open(master: impl AsRef<Path>, config: MultiArchiveConfig) -> Result<Self> {
        let archives = master::read_master(master.as_ref(), &config)?;
        debug!("Opened {} with {} sub-archives", master.as_ref().display(), archives.len());
        Ok(Self {
            inner: Rc::new(MultiInner {
                archives,
                channels: RefCell::new(Vec::new()),
                queried: Cell::new(false),
            }),
        })
    }

    /// Sub-archive directory files, in master file order.
    pub fn archives(&self) -> &[PathBuf] {
        &self.inner.archives
    }

    /// Time ranges of all channels, querying every sub-archive once.
    pub fn channels(&self) -> Result<Vec<ChannelSummary>> {
        self.inner.query_all_archives()?;
        Ok(self.inner.channels.borrow().clone())
    }

    /// Iterator positioned on the first channel of any sub-archive.
    pub fn find_first(&self) -> Result<MultiChannelIter> {
        self.inner.query_all_archives()?;
        Ok(MultiChannelIter::start(self.inner.clone(), None))
    }

    /// Looks up a channel by name, checking sub-archives in order.
    pub fn find_by_name(&self, name: &str) -> Result<Option<MultiChannel>> {
        if self.inner.queried.get() {
            let index = self.inner.channels.borrow().iter().position(|c| c.name == name);
            return Ok(index.map(|index| MultiChannel::new(self.inner.clone(), index)));
        }
        for path in &self.inner.archives {
            let archive = MultiInner::open_sub(path)?;
            if archive.find_by_name(name)?.is_some() {
                let index = self.inner.summary_index(name);
                return Ok(Some(MultiChannel::new(self.inner.clone(), index)));
            }
        }
        Ok(None)
    }

    /// Iterator over the channels matching `pattern`. An empty pattern
    /// matches all channels.
    pub fn find_by_pattern(&self, pattern: &str) -> Result<MultiChannelIter> {
        if pattern.is_empty() {
            return self.find_first();
        }
        let regex = Regex::new(pattern)?;
        self.inner.query_all_archives()?;
        Ok(MultiChannelIter::start(self.inner.clone(), Some(regex)))
    }

    /// Always fails, a multi archive cannot be written.
    pub fn add_channel(&self, _name: &str) -> Result<MultiChannel> {
        Err(ArchiveError::invalid(READ_ONLY))
    }

    /// Creates an unpositioned cursor.
    pub fn new_cursor(&self) -> MultiCursor {
        MultiCursor::new(self.inner.clone())
    }
}

/// A channel of a [`MultiArchive`].
#[derive(Debug, Clone)]
pub struct MultiChannel {
    inner: Rc<MultiInner>,
    index: usize,
}

impl MultiChannel {
    fn new(inner: Rc<MultiInner>, index: usize) -> Self {
        Self { inner, index }
    }

    /// Channel name.
    pub fn name(&self) -> String {
        self.inner.name(self.index).unwrap_or_default()
    }

    /// Earliest sample time over all sub-archives.
    pub fn first_time(&self) -> Result<EpicsTime> {
        Ok(self.inner.summary(self.index)?.map_or(EpicsTime::NULL, |s| s.first_time))
    }

    /// Latest sample time over all sub-archives.
    pub fn last_time(&self) -> Result<EpicsTime> {
        Ok(self.inner.summary(self.index)?.map_or(EpicsTime::NULL, |s| s.last_time))
    }

    /// Positions `cursor` on the first sample.
    pub fn first_value(&self, cursor: &mut MultiCursor) -> Result<bool> {
        let time = self.first_time()?;
        self.value_after_time(time, cursor)
    }

    /// Positions `cursor` on the last sample.
    pub fn last_value(&self, cursor: &mut MultiCursor) -> Result<bool> {
        let time = self.last_time()?;
        self.value_after_time(time, cursor)
    }

    /// Positions `cursor` on the first sample at or after `time`.
    pub fn value_after_time(&self, time: EpicsTime, cursor: &mut MultiCursor) -> Result<bool> {
        let time = self.or_first_time(time)?;
        self.settle(cursor, |inner, c| inner.value_after_time(self.index, time, c))
    }

    /// Positions `cursor` on the last sample at or before `time`.
    pub fn value_before_time(&self, time: EpicsTime, cursor: &mut MultiCursor) -> Result<bool> {
        let time = self.or_first_time(time)?;
        self.settle(cursor, |inner, c| inner.value_at_or_before_time(self.index, time, true, c))
    }

    /// Positions `cursor` on the sample closest to `time`.
    pub fn value_near_time(&self, time: EpicsTime, cursor: &mut MultiCursor) -> Result<bool> {
        let time = self.or_first_time(time)?;
        self.settle(cursor, |inner, c| inner.value_near_time(self.index, time, c))
    }

    /// Always fails, a multi archive cannot be written.
    pub fn lock_buffer(&mut self, _sample: &Sample, _period: f64) -> Result<usize> {
        Err(ArchiveError::invalid(READ_ONLY))
    }

    /// Always fails, a multi archive cannot be written.
    pub fn add_buffer(&mut self, _sample: &Sample, _info: &CtrlInfo, _period: f64, _count: usize) -> Result<()> {
        Err(ArchiveError::invalid(READ_ONLY))
    }

    /// Always fails, a multi archive cannot be written.
    pub fn add_value(&mut self, _sample: &Sample) -> Result<bool> {
        Err(ArchiveError::invalid(READ_ONLY))
    }

    /// Always fails, a multi archive cannot be written.
    pub fn release_buffer(&mut self) -> Result<()> {
        Err(ArchiveError::invalid(READ_ONLY))
    }

    fn or_first_time(&self, time: EpicsTime) -> Result<EpicsTime> {
        if time.is_valid() {
            Ok(time)
        } else {
            self.first_time()
        }
    }

    fn settle(
        &self,
        cursor: &mut MultiCursor,
        lookup: impl FnOnce(&MultiInner, &mut MultiCursor) -> Result<bool>,
    ) -> Result<bool> {
        if lookup(&self.inner, cursor)? {
            return Ok(true);
        }
        cursor.clear();
        Ok(false)
    }
}

/// Walks the channels of a [`MultiArchive`].
#[derive(Debug)]
pub struct MultiChannelIter {
    inner: Rc<MultiInner>,
    index: usize,
    pattern: Option<Regex>,
}

impl MultiChannelIter {
    fn start(inner: Rc<MultiInner>, pattern: Option<Regex>) -> Self {
        let mut iter = Self {
            inner,
            index: 0,
            pattern,
        };
        if iter.is_valid() && !iter.matches() {
            iter.next();
        }
        iter
    }

    fn matches(&self) -> bool {
        match (&self.pattern, self.inner.name(self.index)) {
            (Some(pattern), Some(name)) => pattern.is_match(&name),
            _ => true,
        }
    }

    /// Returns true while positioned on a channel.
    pub fn is_valid(&self) -> bool {
        self.index < self.inner.channels.borrow().len()
    }

    /// Current channel.
    pub fn current(&self) -> Option<MultiChannel> {
        self.is_valid()
            .then(|| MultiChannel::new(self.inner.clone(), self.index))
    }

    /// Moves to the next matching channel.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        loop {
            self.index += 1;
            if !self.is_valid() || self.matches() {
                return self.is_valid();
            }
        }
    }
}
