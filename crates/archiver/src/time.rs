//! EPICS time stamps.
//!
//! Archive files store time as seconds and nanoseconds past the EPICS epoch,
//! 1990-01-01 00:00:00 UTC, both as big-endian `u32`:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┐
//! │  secs past epoch u32 │  nanoseconds u32     │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! All rounding helpers work on integer nanoseconds past that epoch so that
//! grid and partition boundaries are exact.

use bytes::{Buf, BufMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;

/// Offset of the EPICS epoch from the Unix epoch, in seconds.
pub const EPICS_EPOCH_UNIX_SECS: i64 = 631_152_000;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Text layout used by master files and diagnostics.
const TEXT_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// A time stamp in seconds and nanoseconds past 1990-01-01 UTC.
///
/// Field order makes the derived ordering chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EpicsTime {
    secs: u32,
    nanos: u32,
}

impl EpicsTime {
    /// The null time stamp, used as "no time".
    pub const NULL: Self = Self { secs: 0, nanos: 0 };

    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    /// Creates a time stamp, carrying excess nanoseconds into seconds.
    pub fn new(secs: u32, nanos: u32) -> Self {
        Self::from_total_nanos(secs as i128 * NANOS_PER_SEC + nanos as i128)
    }

    /// Seconds past the EPICS epoch.
    pub fn secs(&self) -> u32 {
        self.secs
    }

    /// Nanoseconds within the second.
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Returns true for [`EpicsTime::NULL`].
    pub fn is_null(&self) -> bool {
        self.secs == 0 && self.nanos == 0
    }

    /// A usable time stamp: not null and with a normalized nanosecond field.
    pub fn is_valid(&self) -> bool {
        !self.is_null() && (self.nanos as i128) < NANOS_PER_SEC
    }

    /// Converts fractional seconds past the EPICS epoch.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self::from_total_nanos((secs * 1e9).round() as i128)
    }

    /// Fractional seconds past the EPICS epoch.
    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.nanos as f64 / 1e9
    }

    /// Returns this time shifted by `delta` seconds (may be negative),
    /// saturating at the representable range.
    pub fn add_secs(self, delta: f64) -> Self {
        Self::from_total_nanos(self.total_nanos() + (delta * 1e9).round() as i128)
    }

    /// `self - other` in seconds.
    pub fn diff_secs(self, other: Self) -> f64 {
        (self.total_nanos() - other.total_nanos()) as f64 / 1e9
    }

    /// Converts a UTC date time. Times before the EPICS epoch map to NULL.
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        let secs = dt.timestamp() - EPICS_EPOCH_UNIX_SECS;
        let nanos = dt.timestamp_subsec_nanos() as i128;
        Self::from_total_nanos(secs as i128 * NANOS_PER_SEC + nanos)
    }

    /// Converts to a UTC date time.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.secs as i64 + EPICS_EPOCH_UNIX_SECS, self.nanos)
            .single()
    }

    /// Builds a time stamp from UTC calendar fields.
    pub fn from_ymd_hms(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)?;
        Some(Self::from_datetime(&Utc.from_utc_datetime(&naive)))
    }

    /// Rounds down to a multiple of `step` seconds.
    /// A non-positive step leaves the time unchanged.
    pub fn round_down(self, step: f64) -> Self {
        match step_nanos(step) {
            Some(step) => {
                let t = self.total_nanos();
                Self::from_total_nanos(t - t.rem_euclid(step))
            }
            None => self,
        }
    }

    /// First multiple of `step` seconds strictly after this time.
    pub fn round_up(self, step: f64) -> Self {
        match step_nanos(step) {
            Some(step) => {
                let t = self.total_nanos();
                Self::from_total_nanos(t - t.rem_euclid(step) + step)
            }
            None => self,
        }
    }

    /// Rounds to the nearest multiple of `step` seconds, halves going up.
    pub fn round(self, step: f64) -> Self {
        match step_nanos(step) {
            Some(step) => {
                let t = self.total_nanos() + step / 2;
                Self::from_total_nanos(t - t.rem_euclid(step))
            }
            None => self,
        }
    }

    /// Parses `YYYY/MM/DD HH:MM:SS[.fffffffff]` as UTC.
    pub fn parse(text: &str) -> Option<Self> {
        let format = format!("{TEXT_FORMAT}%.f");
        let naive = NaiveDateTime::parse_from_str(text.trim(), &format).ok()?;
        let dt = Utc.from_utc_datetime(&naive);
        if dt.timestamp() < EPICS_EPOCH_UNIX_SECS {
            return None;
        }
        Some(Self::from_datetime(&dt))
    }

    /// Writes the big-endian wire form.
    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.secs);
        buf.put_u32(self.nanos);
    }

    /// Reads the big-endian wire form. The caller guarantees 8 bytes.
    pub fn get(buf: &mut impl Buf) -> Self {
        let secs = buf.get_u32();
        let nanos = buf.get_u32();
        Self { secs, nanos }
    }

    fn total_nanos(&self) -> i128 {
        self.secs as i128 * NANOS_PER_SEC + self.nanos as i128
    }

    fn from_total_nanos(total: i128) -> Self {
        let max = (u32::MAX as i128 + 1) * NANOS_PER_SEC - 1;
        let total = total.clamp(0, max);
        Self {
            secs: (total / NANOS_PER_SEC) as u32,
            nanos: (total % NANOS_PER_SEC) as u32,
        }
    }
}

fn step_nanos(step: f64) -> Option<i128> {
    let nanos = (step * 1e9).round();
    if nanos >= 1.0 && nanos.is_finite() {
        Some(nanos as i128)
    } else {
        None
    }
}

impl fmt::Display for EpicsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}.{:09}", dt.format(TEXT_FORMAT), self.nanos),
            None => write!(f, "<invalid {}.{:09}>", self.secs, self.nanos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_conversion() {
        let t = EpicsTime::from_ymd_hms(1990, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(t.secs(), 10);
        assert_eq!(t.to_datetime().unwrap().timestamp(), EPICS_EPOCH_UNIX_SECS + 10);
    }

    #[test]
    fn test_rounding() {
        let t = EpicsTime::new(105, 500_000_000);
        assert_eq!(t.round_down(10.0), EpicsTime::new(100, 0));
        assert_eq!(t.round_up(10.0), EpicsTime::new(110, 0));
        assert_eq!(t.round(10.0), EpicsTime::new(110, 0));
        assert_eq!(EpicsTime::new(104, 0).round(10.0), EpicsTime::new(100, 0));
        // Aligned times still move to the next slot
        assert_eq!(EpicsTime::new(100, 0).round_up(10.0), EpicsTime::new(110, 0));
        assert_eq!(t.round_down(0.0), t);
    }

    #[test]
    fn test_arithmetic() {
        let t = EpicsTime::new(100, 0);
        assert_eq!(t.add_secs(0.5), EpicsTime::new(100, 500_000_000));
        assert_eq!(t.add_secs(-200.0), EpicsTime::NULL);
        assert!((EpicsTime::new(102, 250_000_000).diff_secs(t) - 2.25).abs() < 1e-12);
        assert_eq!(EpicsTime::new(1, 1_500_000_000), EpicsTime::new(2, 500_000_000));
    }

    #[test]
    fn test_parse_and_display() {
        let t = EpicsTime::parse("2003/04/05 06:07:08").unwrap();
        assert_eq!(t.to_string(), "2003/04/05 06:07:08.000000000");
        let t = EpicsTime::parse("2003/04/05 06:07:08.25").unwrap();
        assert_eq!(t.nanos(), 250_000_000);
        assert!(EpicsTime::parse("1980/01/01 00:00:00").is_none());
        assert!(EpicsTime::parse("not a time").is_none());
    }

    #[test]
    fn test_wire_roundtrip() {
        let t = EpicsTime::new(0x01020304, 0x05060708);
        let mut buf = Vec::new();
        t.put(&mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(EpicsTime::get(&mut &buf[..]), t);
    }
}
