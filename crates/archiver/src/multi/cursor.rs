//! Cursor that stitches sub-archive cursors together.

use super::MultiInner;
use crate::archive::Channel;
use crate::codec::{CtrlInfo, Sample};
use crate::cursor::Cursor;
use crate::error::Result;
use crate::iter::ValueIterator;
use crate::time::EpicsTime;
use std::path::Path;
use std::rc::Rc;

/// Nudge past the last sample of a sub-archive when moving on.
const EPSILON_SECS: f64 = 1e-9;

/// Iterates one channel across the sub-archives of a
/// [`MultiArchive`](super::MultiArchive).
///
/// Running off either end of the current sub-archive looks the channel up
/// again just past that end, so iteration continues in whichever
/// sub-archive holds the adjacent samples.
#[derive(Debug)]
pub struct MultiCursor {
    inner: Rc<MultiInner>,
    index: usize,
    channel: Option<Channel>,
    values: Option<Cursor>,
    valid: bool,
}

impl MultiCursor {
    pub(crate) fn new(inner: Rc<MultiInner>) -> Self {
        Self {
            inner,
            index: 0,
            channel: None,
            values: None,
            valid: false,
        }
    }

    pub(crate) fn position(&mut self, index: usize, channel: Channel, values: Cursor) {
        self.valid = values.is_valid();
        self.index = index;
        self.channel = Some(channel);
        self.values = Some(values);
    }

    /// Drops the current sub-archive position.
    pub fn clear(&mut self) {
        self.channel = None;
        self.values = None;
        self.valid = false;
    }

    /// Directory of the sub-archive currently read.
    pub fn archive_dir(&self) -> Option<&Path> {
        self.channel.as_ref().map(Channel::dirname)
    }
}

impl ValueIterator for MultiCursor {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn value(&self) -> Option<&Sample> {
        self.values.as_ref().filter(|_| self.valid).and_then(|v| v.value())
    }

    fn ctrl_info(&self) -> Option<&CtrlInfo> {
        self.values.as_ref().filter(|_| self.valid).and_then(|v| v.ctrl_info())
    }

    fn period(&self) -> f64 {
        self.values.as_ref().map_or(0.0, |v| v.period())
    }

    fn next(&mut self) -> Result<bool> {
        if let Some(values) = self.values.as_mut() {
            if values.next()? {
                self.valid = true;
                return Ok(true);
            }
        }
        let Some(channel) = self.channel.as_ref() else {
            self.valid = false;
            return Ok(false);
        };
        let after = channel.last_time().add_secs(EPSILON_SECS);
        let inner = self.inner.clone();
        self.valid = inner.value_after_time(self.index, after, self)?;
        Ok(self.valid)
    }

    fn prev(&mut self) -> Result<bool> {
        if let Some(values) = self.values.as_mut() {
            if values.prev()? {
                self.valid = true;
                return Ok(true);
            }
        }
        let Some(channel) = self.channel.as_ref() else {
            self.valid = false;
            return Ok(false);
        };
        let before = channel.first_time();
        let inner = self.inner.clone();
        self.valid = inner.value_at_or_before_time(self.index, before, false, self)?;
        Ok(self.valid)
    }

    fn determine_chunk(&self, until: Option<EpicsTime>) -> Result<usize> {
        match self.values.as_ref().filter(|_| self.valid) {
            Some(values) => values.determine_chunk(until),
            None => Ok(0),
        }
    }
}
