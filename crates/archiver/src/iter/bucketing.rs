//! Reduction of fixed-width time buckets to at most four points.

use super::{double_sample, ValueIterator};
use crate::codec::{CtrlInfo, Sample, Severity};
use crate::error::{ArchiveError, Result};
use crate::time::EpicsTime;

/// Filling state of the current bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Init,
    Values,
    Out,
}

/// Next point to emit from a full bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    First,
    Min,
    Max,
    Last,
    Done,
}

/// Emits first, min, max and last value of every `delta_t` bucket,
/// leaving out points equal to the one before, so a flat bucket yields a
/// single point. Info markers end a bucket and are passed through as-is.
///
/// All points of a bucket carry the bucket start time. Only forward
/// iteration is supported.
#[derive(Debug)]
pub struct BucketingIterator<I> {
    base: I,
    delta_t: f64,
    fill: Fill,
    emit: Emit,
    time: EpicsTime,
    first: f64,
    min: f64,
    max: f64,
    last: f64,
    status: u16,
    severity: Severity,
    info: Option<CtrlInfo>,
    value: Option<Sample>,
}

impl<I: ValueIterator> BucketingIterator<I> {
    /// Starts at the current sample of `base` and computes the first point.
    pub fn new(base: I, delta_t: f64) -> Result<Self> {
        let Some(time) = base.value().filter(|_| base.is_valid()).map(|v| v.time) else {
            return Err(ArchiveError::invalid("Invalid base iterator"));
        };
        let mut iter = Self {
            base,
            delta_t,
            fill: Fill::Init,
            emit: Emit::Done,
            time,
            first: 0.0,
            min: 0.0,
            max: 0.0,
            last: 0.0,
            status: 0,
            severity: Severity::NO_ALARM,
            info: None,
            value: None,
        };
        iter.next()?;
        Ok(iter)
    }

    /// Bucket width in seconds.
    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    fn point(&self, value: f64) -> Sample {
        let mut sample = Sample::double(self.time, value);
        sample.set_status(self.status, self.severity);
        sample
    }

    /// Steps the emission state. Returns true when a point was produced.
    fn emit_next(&mut self) -> Result<Option<bool>> {
        let point = match self.emit {
            Emit::First => {
                self.emit = Emit::Min;
                Some(self.first)
            }
            Emit::Min => {
                self.emit = Emit::Max;
                Some(self.min).filter(|min| *min != self.first)
            }
            Emit::Max => {
                self.emit = Emit::Last;
                Some(self.max).filter(|max| *max != self.min)
            }
            Emit::Last => {
                self.emit = Emit::Done;
                Some(self.last).filter(|last| *last != self.max)
            }
            Emit::Done => {
                self.fill = Fill::Init;
                let Some(sample) = self.base.value().filter(|_| self.base.is_valid()).cloned() else {
                    return Ok(Some(false));
                };
                if sample.is_info() {
                    self.value = Some(double_sample(&sample, sample.to_double(0).unwrap_or_default()));
                    self.info = self.base.ctrl_info().cloned();
                    self.base.next()?;
                    // Stay valid while showing the marker, even if it was the last sample
                    self.fill = Fill::Out;
                    return Ok(Some(true));
                }
                self.time = sample.time;
                None
            }
        };
        if let Some(value) = point {
            self.value = Some(self.point(value));
            return Ok(Some(true));
        }
        Ok(None)
    }
}

impl<I: ValueIterator> ValueIterator for BucketingIterator<I> {
    fn is_valid(&self) -> bool {
        self.base.is_valid() || self.fill != Fill::Init
    }

    fn value(&self) -> Option<&Sample> {
        self.value.as_ref().filter(|_| self.is_valid())
    }

    fn ctrl_info(&self) -> Option<&CtrlInfo> {
        self.info.as_ref().filter(|_| self.is_valid())
    }

    /// The bucket width.
    fn period(&self) -> f64 {
        self.delta_t
    }

    fn next(&mut self) -> Result<bool> {
        loop {
            let current = self.base.value().filter(|_| self.base.is_valid()).cloned();
            let bucket_end = self.time.add_secs(self.delta_t);
            match current {
                Some(sample) if self.fill != Fill::Out && sample.time <= bucket_end && !sample.is_info() => {
                    let v = sample.to_double(0)?;
                    if self.fill == Fill::Init {
                        self.time = sample.time.round(self.delta_t);
                        self.first = v;
                        self.min = v;
                        self.max = v;
                        self.emit = Emit::First;
                        self.fill = Fill::Values;
                    }
                    self.last = v;
                    self.min = self.min.min(v);
                    self.max = self.max.max(v);
                    self.status = sample.status;
                    self.severity = sample.severity;
                    self.info = self.base.ctrl_info().cloned();
                    self.base.next()?;
                }
                _ => {
                    self.fill = Fill::Out;
                    if let Some(produced) = self.emit_next()? {
                        return Ok(produced);
                    }
                }
            }
        }
    }

    fn prev(&mut self) -> Result<bool> {
        Err(ArchiveError::invalid("Can't go backwards while bucketing"))
    }

    fn determine_chunk(&self, _until: Option<EpicsTime>) -> Result<usize> {
        Ok(usize::from(self.base.is_valid()))
    }
}
