//! Expansion of repeat-count markers into the samples they stand for.

use super::ValueIterator;
use crate::codec::{CtrlInfo, Sample, Severity};
use crate::error::{ArchiveError, Result};
use crate::time::EpicsTime;
use tracing::warn;

/// Replaces each repeat marker by clones of the preceding sample, one per
/// sampling period up to the marker's time stamp.
///
/// Only forward iteration is supported.
#[derive(Debug)]
pub struct ExpandingIterator<I> {
    base: I,
    repeat: Option<Sample>,
    repeat_info: Option<CtrlInfo>,
    until: EpicsTime,
}

impl<I: ValueIterator> ExpandingIterator<I> {
    /// Wraps `base`, which may already be positioned.
    pub fn new(base: I) -> Self {
        let mut iter = Self {
            base,
            repeat: None,
            repeat_info: None,
            until: EpicsTime::NULL,
        };
        // A leading marker has no predecessor to clone. Keep it as a plain
        // sample at its own time.
        if let Some(value) = iter.base.value().filter(|v| v.is_repeat()) {
            let mut value = value.clone();
            value.set_status(0, Severity::NO_ALARM);
            iter.until = value.time;
            iter.repeat = Some(value);
            iter.repeat_info = iter.base.ctrl_info().cloned();
        }
        iter
    }

    /// The wrapped iterator.
    pub fn base(&self) -> &I {
        &self.base
    }

    /// Unwraps the base iterator.
    pub fn into_inner(self) -> I {
        self.base
    }
}

impl<I: ValueIterator> ValueIterator for ExpandingIterator<I> {
    fn is_valid(&self) -> bool {
        self.base.is_valid()
    }

    fn value(&self) -> Option<&Sample> {
        match &self.repeat {
            Some(repeat) => Some(repeat),
            None => self.base.value(),
        }
    }

    fn ctrl_info(&self) -> Option<&CtrlInfo> {
        match &self.repeat {
            Some(_) => self.repeat_info.as_ref(),
            None => self.base.ctrl_info(),
        }
    }

    fn period(&self) -> f64 {
        self.base.period()
    }

    fn next(&mut self) -> Result<bool> {
        let period = self.base.period();
        if let Some(repeat) = self.repeat.as_mut() {
            let time = repeat.time.add_secs(period);
            if time <= self.until {
                repeat.time = time;
                return Ok(true);
            }
            self.repeat = None;
        }

        loop {
            if !self.base.is_valid() {
                return Ok(false);
            }
            let last = self
                .base
                .value()
                .filter(|v| !v.is_info())
                .cloned()
                .map(|v| (v, self.base.ctrl_info().cloned()));

            if !self.base.next()? {
                return Ok(false);
            }
            let Some(marker_time) = self.base.value().filter(|v| v.is_repeat()).map(|v| v.time) else {
                return Ok(true);
            };
            let period = self.base.period();
            match last {
                Some((mut value, info)) if period > 0.0 => {
                    let first = value.time.round_up(period);
                    value.time = if first > marker_time { marker_time } else { first };
                    self.until = marker_time;
                    self.repeat = Some(value);
                    self.repeat_info = info;
                    return Ok(true);
                }
                // Nothing to clone, or no period to step by: drop the marker
                _ => continue,
            }
        }
    }

    fn prev(&mut self) -> Result<bool> {
        Err(ArchiveError::Unsupported(
            "Repeat expansion cannot iterate backwards".to_string(),
        ))
    }

    fn determine_chunk(&self, until: Option<EpicsTime>) -> Result<usize> {
        warn!("determine_chunk on an expanding iterator returns the base count");
        self.base.determine_chunk(until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::testing::VecIterator;

    fn t(secs: u32) -> EpicsTime {
        EpicsTime::new(secs, 0)
    }

    fn repeat(secs: u32, count: u16) -> Sample {
        let mut s = Sample::double(t(secs), 0.0);
        s.set_status(count, Severity::ARCH_REPEAT);
        s
    }

    fn collect<I: ValueIterator>(iter: &mut I) -> Vec<(u32, f64)> {
        let mut out = Vec::new();
        while iter.is_valid() {
            let v = iter.value().unwrap();
            out.push((v.time.secs(), v.to_double(0).unwrap()));
            if !iter.next().unwrap() {
                break;
            }
        }
        out
    }

    #[test]
    fn test_expands_repeat_marker() {
        let base = VecIterator::new(
            vec![Sample::double(t(100), 5.0), repeat(130, 3), Sample::double(t(140), 6.0)],
            10.0,
        );
        let mut iter = ExpandingIterator::new(base);
        assert_eq!(
            collect(&mut iter),
            vec![(100, 5.0), (110, 5.0), (120, 5.0), (130, 5.0), (140, 6.0)]
        );
    }

    #[test]
    fn test_first_clone_capped_at_marker() {
        let base = VecIterator::new(vec![Sample::double(t(101), 1.0), repeat(105, 1)], 10.0);
        let mut iter = ExpandingIterator::new(base);
        assert_eq!(collect(&mut iter), vec![(101, 1.0), (105, 1.0)]);
    }

    #[test]
    fn test_repeat_after_info_is_skipped() {
        let mut off = Sample::double(t(100), 0.0);
        off.set_status(0, Severity::ARCH_DISCONNECT);
        let base = VecIterator::new(vec![off, repeat(120, 2), Sample::double(t(130), 3.0)], 10.0);
        let mut iter = ExpandingIterator::new(base);
        assert_eq!(collect(&mut iter), vec![(100, 0.0), (130, 3.0)]);
    }

    #[test]
    fn test_leading_repeat_is_plain_value() {
        let base = VecIterator::new(vec![repeat(100, 4), Sample::double(t(110), 2.0)], 10.0);
        let mut iter = ExpandingIterator::new(base);
        let first = iter.value().unwrap();
        assert_eq!(first.severity, Severity::NO_ALARM);
        assert_eq!(first.time, t(100));
        assert_eq!(collect(&mut iter), vec![(100, 0.0), (110, 2.0)]);
    }

    #[test]
    fn test_prev_is_unsupported() {
        let base = VecIterator::new(vec![Sample::double(t(1), 1.0)], 1.0);
        let mut iter = ExpandingIterator::new(base);
        assert!(matches!(iter.prev(), Err(ArchiveError::Unsupported(_))));
    }
}
