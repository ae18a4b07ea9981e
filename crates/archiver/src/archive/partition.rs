//! Time-based data file layout.
//!
//! Every buffer goes into the data file of the partition that holds the
//! time stamp of its first sample. Partition boundaries are computed in UTC.

use crate::time::EpicsTime;
use chrono::{Datelike, Timelike};
use tracing::warn;

/// Seconds per file that select monthly partitioning.
pub const SECS_PER_MONTH: u32 = 2_678_400;

/// How samples are spread over data files.
///
/// # Examples
/// ```rust,ignore
/// use alopex_archiver::archive::FilePartitioning;
///
/// let daily = FilePartitioning::Seconds(86_400);
/// let name = daily.data_file_name(time);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilePartitioning {
    /// One file per calendar month.
    #[default]
    Monthly,
    /// One file per fixed number of seconds.
    Seconds(u32),
}

impl FilePartitioning {
    /// Builds a partitioning from a seconds-per-file setting, where
    /// [`SECS_PER_MONTH`] selects calendar months.
    pub fn from_secs_per_file(secs: u32) -> Self {
        if secs == SECS_PER_MONTH || secs == 0 {
            Self::Monthly
        } else {
            Self::Seconds(secs)
        }
    }

    /// Seconds-per-file setting, [`SECS_PER_MONTH`] for monthly files.
    pub fn secs_per_file(self) -> u32 {
        match self {
            Self::Monthly => SECS_PER_MONTH,
            Self::Seconds(secs) => secs,
        }
    }

    /// Start of the partition holding `time`.
    pub fn partition_start(self, time: EpicsTime) -> EpicsTime {
        match self {
            Self::Monthly => time
                .to_datetime()
                .and_then(|dt| EpicsTime::from_ymd_hms(dt.year(), dt.month(), 1, 0, 0, 0))
                .unwrap_or(EpicsTime::NULL),
            Self::Seconds(secs) => time.round_down(secs as f64),
        }
    }

    /// Data file name for samples at `time`: `YYYYMMDD-HHMMSS` of the
    /// partition start.
    pub fn data_file_name(self, time: EpicsTime) -> String {
        let start = self.partition_start(time);
        match start.to_datetime() {
            Some(dt) => format!(
                "{:04}{:02}{:02}-{:02}{:02}{:02}",
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second()
            ),
            None => "19900101-000000".to_string(),
        }
    }

    /// Time at which samples following `time` go into a new file.
    pub fn next_file_time(self, time: EpicsTime) -> EpicsTime {
        if !time.is_valid() {
            warn!("next_file_time: given invalid time {:?}", time);
            return EpicsTime::NULL;
        }
        match self {
            Self::Monthly => {
                let Some(dt) = time.to_datetime() else {
                    return EpicsTime::NULL;
                };
                let (year, month) = if dt.month() == 12 {
                    (dt.year() + 1, 1)
                } else {
                    (dt.year(), dt.month() + 1)
                };
                EpicsTime::from_ymd_hms(year, month, 1, 0, 0, 0).unwrap_or(EpicsTime::NULL)
            }
            Self::Seconds(secs) => {
                let step = secs as f64;
                // +1 s in case the time is right on a boundary
                time.round_down(step).add_secs(1.0).round_up(step)
            }
        }
    }

    /// Reverses [`FilePartitioning::data_file_name`] into the partition start.
    pub fn parse_file_name(name: &str) -> Option<EpicsTime> {
        let (date, time) = name.split_once('-')?;
        if date.len() != 8 || time.len() != 6 || !date.bytes().chain(time.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let field = |s: &str| s.parse::<u32>().ok();
        EpicsTime::from_ymd_hms(
            date[0..4].parse().ok()?,
            field(&date[4..6])?,
            field(&date[6..8])?,
            field(&time[0..2])?,
            field(&time[2..4])?,
            field(&time[4..6])?,
        )
    }
}
