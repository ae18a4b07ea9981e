//! Sample iterators and the transforms layered on top of them.
//!
//! Everything that walks samples implements [`ValueIterator`]: the raw
//! [`Cursor`](crate::cursor::Cursor), the multi-archive cursor and the
//! transforms in this module, which wrap any other `ValueIterator` and
//! synthesize their own current sample:
//!
//! ```text
//! Cursor ──▶ InfoFilter ──▶ LinearInterpolation ──▶ caller
//!        ──▶ Expanding  ──▶ Bucketing           ──▶ caller
//! ```

pub mod bucketing;
pub mod expanding;
pub mod info_filter;
pub mod interpolate;

pub use bucketing::BucketingIterator;
pub use expanding::ExpandingIterator;
pub use info_filter::InfoFilterIterator;
pub use interpolate::LinearInterpolationIterator;

use crate::codec::{CtrlInfo, Sample};
use crate::error::Result;
use crate::time::EpicsTime;

/// Bidirectional iteration over the samples of one channel.
///
/// `next` and `prev` return `Ok(false)` once the iterator runs off either
/// end; it is then invalid until repositioned.
pub trait ValueIterator {
    /// Returns true while positioned on a sample.
    fn is_valid(&self) -> bool;

    /// Current sample.
    fn value(&self) -> Option<&Sample>;

    /// CtrlInfo of the current sample.
    fn ctrl_info(&self) -> Option<&CtrlInfo>;

    /// Sampling period of the current sample, in seconds.
    fn period(&self) -> f64;

    /// Moves to the following sample.
    fn next(&mut self) -> Result<bool>;

    /// Moves to the preceding sample.
    fn prev(&mut self) -> Result<bool>;

    /// Number of following samples, starting with the current one, that
    /// share type, CtrlInfo and period and lie before `until`. A raw
    /// cursor never counts past the end of its current buffer.
    fn determine_chunk(&self, until: Option<EpicsTime>) -> Result<usize>;
}

impl<I: ValueIterator + ?Sized> ValueIterator for Box<I> {
    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn value(&self) -> Option<&Sample> {
        (**self).value()
    }

    fn ctrl_info(&self) -> Option<&CtrlInfo> {
        (**self).ctrl_info()
    }

    fn period(&self) -> f64 {
        (**self).period()
    }

    fn next(&mut self) -> Result<bool> {
        (**self).next()
    }

    fn prev(&mut self) -> Result<bool> {
        (**self).prev()
    }

    fn determine_chunk(&self, until: Option<EpicsTime>) -> Result<usize> {
        (**self).determine_chunk(until)
    }
}

/// Scalar Double sample with the stamp and status of `base`.
pub(crate) fn double_sample(base: &Sample, value: f64) -> Sample {
    let mut out = Sample::double(base.time, value);
    out.set_status(base.status, base.severity);
    out
}
