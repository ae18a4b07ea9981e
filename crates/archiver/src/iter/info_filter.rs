//! Pass-through iterator that hides info markers.

use super::ValueIterator;
use crate::codec::{CtrlInfo, Sample};
use crate::error::Result;
use crate::time::EpicsTime;

/// Skips samples that are info markers when stepping.
///
/// The sample the base is positioned on when wrapped is not checked.
#[derive(Debug)]
pub struct InfoFilterIterator<I> {
    base: I,
}

impl<I: ValueIterator> InfoFilterIterator<I> {
    /// Wraps `base`.
    pub fn new(base: I) -> Self {
        Self { base }
    }

    /// Unwraps the base iterator.
    pub fn into_inner(self) -> I {
        self.base
    }

    fn on_info(&self) -> bool {
        self.base.value().map_or(false, Sample::is_info)
    }
}

impl<I: ValueIterator> ValueIterator for InfoFilterIterator<I> {
    fn is_valid(&self) -> bool {
        self.base.is_valid()
    }

    fn value(&self) -> Option<&Sample> {
        self.base.value()
    }

    fn ctrl_info(&self) -> Option<&CtrlInfo> {
        self.base.ctrl_info()
    }

    fn period(&self) -> f64 {
        self.base.period()
    }

    fn next(&mut self) -> Result<bool> {
        loop {
            if !self.base.next()? {
                return Ok(false);
            }
            if !self.on_info() {
                return Ok(true);
            }
        }
    }

    fn prev(&mut self) -> Result<bool> {
        loop {
            if !self.base.prev()? {
                return Ok(false);
            }
            if !self.on_info() {
                return Ok(true);
            }
        }
    }

    fn determine_chunk(&self, until: Option<EpicsTime>) -> Result<usize> {
        self.base.determine_chunk(until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Severity;
    use crate::iter::testing::VecIterator;

    #[test]
    fn test_skips_info_both_ways() {
        let t = |s| EpicsTime::new(s, 0);
        let mut off = Sample::double(t(20), 0.0);
        off.set_status(0, Severity::ARCH_DISABLED);
        let mut stopped = Sample::double(t(30), 0.0);
        stopped.set_status(0, Severity::ARCH_STOPPED);
        let samples = vec![Sample::double(t(10), 1.0), off, stopped, Sample::double(t(40), 4.0)];
        let mut iter = InfoFilterIterator::new(VecIterator::new(samples, 1.0));

        assert!(iter.next().unwrap());
        assert_eq!(iter.value().unwrap().time, t(40));
        assert!(iter.prev().unwrap());
        assert_eq!(iter.value().unwrap().time, t(10));
        assert!(!iter.prev().unwrap());
        assert!(!iter.is_valid());
    }
}
