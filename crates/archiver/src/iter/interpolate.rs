//! Linear interpolation onto a fixed time grid.
//!
//! Info markers are never interpolated across. Hitting one yields the
//! marker once, stamped with the grid time, and the next step resumes on
//! the first grid point after the following real sample. An archive that
//! was off for a day thus shows up as one "off" point, not one per step.

use super::{double_sample, ValueIterator};
use crate::codec::{CtrlInfo, Sample, Severity};
use crate::error::{ArchiveError, Result};
use crate::time::EpicsTime;

/// Resamples its base at multiples of `delta_t` seconds.
#[derive(Debug)]
pub struct LinearInterpolationIterator<I> {
    base: I,
    delta_t: f64,
    max_delta_t: f64,
    time: EpicsTime,
    value: Sample,
    info: Option<CtrlInfo>,
}

impl<I: ValueIterator> LinearInterpolationIterator<I> {
    /// Starts on the current sample of `base`, with the grid aligned to
    /// the nearest multiple of `delta_t`.
    pub fn new(base: I, delta_t: f64) -> Result<Self> {
        let Some(first) = base.value().filter(|_| base.is_valid()) else {
            return Err(ArchiveError::invalid("Invalid base iterator"));
        };
        let value = double_sample(first, first.to_double(0)?);
        let time = value.time.round(delta_t);
        let info = base.ctrl_info().cloned();
        Ok(Self {
            base,
            delta_t,
            max_delta_t: 0.0,
            time,
            value,
            info,
        })
    }

    /// Samples further apart than `max_delta_t` seconds are not
    /// interpolated; the gap reads as archiving stopped. 0 disables the
    /// check.
    pub fn with_max_delta_t(mut self, max_delta_t: f64) -> Self {
        self.max_delta_t = max_delta_t;
        self
    }

    /// Gap limit, 0 when unlimited.
    pub fn max_delta_t(&self) -> f64 {
        self.max_delta_t
    }

    /// Grid step in seconds.
    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    /// Computes the value at an arbitrary `time`, moving the base onto
    /// the left bracket. Returns `None` when the base has no samples on
    /// both sides of `time`.
    pub fn interpolate(&mut self, time: EpicsTime) -> Result<Option<&Sample>> {
        if !self.base.is_valid() {
            return Ok(None);
        }
        // Find t0 <= time < t1
        while self.base_time().map_or(false, |t| t <= time) {
            if !self.base.next()? {
                return Ok(None);
            }
        }
        while self.base_time().map_or(false, |t| t > time) {
            if !self.base.prev()? {
                return Ok(None);
            }
        }

        let Some(left) = self.base.value().cloned() else {
            return Ok(None);
        };
        if left.is_info() {
            self.set_info_value(&left, time);
            return Ok(Some(&self.value));
        }
        let v0 = left.to_double(0)?;
        let t0 = left.time;

        if !self.base.next()? {
            return Ok(None);
        }
        let Some(right) = self.base.value().cloned() else {
            return Ok(None);
        };
        if right.is_info() {
            self.set_info_value(&right, time);
            return Ok(Some(&self.value));
        }
        let v1 = right.to_double(0)?;
        let dt = right.time.diff_secs(t0);

        let mut value = Sample::double(time, v0);
        if self.max_delta_t > 0.0 && dt > self.max_delta_t {
            value.set_status(0, Severity::ARCH_STOPPED);
        } else {
            let v = if dt != 0.0 {
                v0 + (v1 - v0) * time.diff_secs(t0) / dt
            } else {
                (v0 + v1) / 2.0
            };
            value.set_double(v, 0)?;
            value.set_status(right.status, right.severity);
        }
        self.value = value;
        self.info = self.base.ctrl_info().cloned();
        Ok(Some(&self.value))
    }

    fn base_time(&self) -> Option<EpicsTime> {
        self.base.value().map(|v| v.time)
    }

    fn set_info_value(&mut self, marker: &Sample, time: EpicsTime) {
        let mut value = double_sample(marker, marker.to_double(0).unwrap_or_default());
        value.time = time;
        self.value = value;
        self.info = self.base.ctrl_info().cloned();
    }
}

impl<I: ValueIterator> ValueIterator for LinearInterpolationIterator<I> {
    fn is_valid(&self) -> bool {
        self.base.is_valid()
    }

    fn value(&self) -> Option<&Sample> {
        Some(&self.value).filter(|_| self.is_valid())
    }

    fn ctrl_info(&self) -> Option<&CtrlInfo> {
        self.info.as_ref().filter(|_| self.is_valid())
    }

    /// The grid step, not the period of the base.
    fn period(&self) -> f64 {
        self.delta_t
    }

    fn next(&mut self) -> Result<bool> {
        self.time = self.time.add_secs(self.delta_t);
        if self.is_valid() && self.value.is_info() {
            if !self.base.next()? {
                return Ok(false);
            }
            if let Some(t) = self.base_time() {
                self.time = t.round_up(self.delta_t);
            }
        }
        Ok(self.interpolate(self.time)?.is_some())
    }

    fn prev(&mut self) -> Result<bool> {
        self.time = self.time.add_secs(-self.delta_t);
        if self.is_valid() && self.value.is_info() {
            if !self.base.prev()? {
                return Ok(false);
            }
            if let Some(t) = self.base_time() {
                self.time = t.round_down(self.delta_t);
            }
        }
        Ok(self.interpolate(self.time)?.is_some())
    }

    fn determine_chunk(&self, _until: Option<EpicsTime>) -> Result<usize> {
        Ok(usize::from(self.base.is_valid()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::testing::VecIterator;

    fn t(secs: u32) -> EpicsTime {
        EpicsTime::new(secs, 0)
    }

    fn points(samples: Vec<Sample>, delta_t: f64, max_delta_t: f64) -> Vec<(u32, f64, Severity)> {
        let base = VecIterator::new(samples, 10.0);
        let mut iter = LinearInterpolationIterator::new(base, delta_t)
            .unwrap()
            .with_max_delta_t(max_delta_t);
        let mut out = Vec::new();
        while iter.is_valid() {
            let v = iter.value().unwrap();
            out.push((v.time.secs(), v.to_double(0).unwrap(), v.severity));
            if !iter.next().unwrap() {
                break;
            }
        }
        out
    }

    #[test]
    fn test_midpoint() {
        let out = points(
            vec![Sample::double(t(1000), 0.0), Sample::double(t(1010), 10.0)],
            5.0,
            0.0,
        );
        assert_eq!(out, vec![(1000, 0.0, Severity::NO_ALARM), (1005, 5.0, Severity::NO_ALARM)]);
    }

    #[test]
    fn test_interpolate_arbitrary_time() {
        let base = VecIterator::new(
            vec![Sample::double(t(1000), 0.0), Sample::double(t(1010), 10.0), Sample::double(t(1020), 0.0)],
            10.0,
        );
        let mut iter = LinearInterpolationIterator::new(base, 1.0).unwrap();
        let v = iter.interpolate(t(1012)).unwrap().unwrap();
        assert_eq!(v.time, t(1012));
        assert!((v.to_double(0).unwrap() - 8.0).abs() < 1e-9);
        assert!(iter.interpolate(t(1030)).unwrap().is_none());
    }

    #[test]
    fn test_gap_reads_as_stopped() {
        let out = points(
            vec![Sample::double(t(1000), 0.0), Sample::double(t(1100), 10.0)],
            5.0,
            50.0,
        );
        assert_eq!(out[1], (1005, 0.0, Severity::ARCH_STOPPED));
    }

    #[test]
    fn test_info_marker_is_passed_once() {
        let mut off = Sample::double(t(1010), 0.0);
        off.set_status(0, Severity::ARCH_DISCONNECT);
        let out = points(
            vec![
                Sample::double(t(1000), 1.0),
                off,
                Sample::double(t(1030), 3.0),
                Sample::double(t(1040), 4.0),
            ],
            5.0,
            0.0,
        );
        assert_eq!(
            out,
            vec![
                (1000, 1.0, Severity::NO_ALARM),
                (1005, 0.0, Severity::ARCH_DISCONNECT),
                (1035, 3.5, Severity::NO_ALARM),
            ]
        );
    }

    #[test]
    fn test_invalid_base() {
        let base = VecIterator::new(Vec::new(), 1.0);
        assert!(LinearInterpolationIterator::new(base, 1.0).unwrap_err().is_invalid());
    }
}
