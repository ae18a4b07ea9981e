//! Typed sample codec and control metadata.
//!
//! Every sample is stored as a `dbr_time_xxx` record: a common prefix of
//! status, severity and time stamp, followed by the value array at a
//! type-specific offset, padded to a multiple of 8 bytes:
//!
//! ```text
//! ┌────────┬──────────┬───────────────┬─────────┬──────────────┬─────────┐
//! │ status │ severity │ stamp (8)     │ pad     │ value[count] │ pad → 8 │
//! │ u16    │ u16      │ secs, nanos   │ 0..4    │              │         │
//! └────────┴──────────┴───────────────┴─────────┴──────────────┴─────────┘
//! ```
//!
//! All multi-byte fields are big-endian; this module and [`ctrl_info`] are
//! the only places that know about it for sample and metadata payloads.

pub mod ctrl_info;
pub mod format;
pub mod sample;
pub mod status;

pub use ctrl_info::{CtrlInfo, NumericInfo};
pub use format::{format_value, format_value_with_units, parse_value};
pub use sample::{Sample, ValueData};
pub use status::{parse_status, status_text, Severity};

/// Array arity of a sample.
pub type DbrCount = u16;

/// Maximum length of a string element, including its NUL terminator.
pub const MAX_STRING_SIZE: usize = 40;

/// Element type of a channel, using the `DBR_TIME_xxx` wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DbrType {
    /// Fixed 40-byte string.
    String = 14,
    /// 16-bit signed integer.
    Short = 15,
    /// 32-bit float.
    Float = 16,
    /// Enumeration index.
    Enum = 17,
    /// Unsigned byte.
    Char = 18,
    /// 32-bit signed integer.
    Long = 19,
    /// 64-bit float.
    Double = 20,
}

impl DbrType {
    /// Creates a DbrType from its wire code.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            14 => Some(Self::String),
            15 => Some(Self::Short),
            16 => Some(Self::Float),
            17 => Some(Self::Enum),
            18 => Some(Self::Char),
            19 => Some(Self::Long),
            20 => Some(Self::Double),
            _ => None,
        }
    }

    /// Returns the wire code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Byte offset of the first value element inside a sample.
    pub fn value_offset(self) -> usize {
        match self {
            Self::String | Self::Float | Self::Long => 12,
            Self::Short | Self::Enum => 14,
            Self::Char => 15,
            Self::Double => 16,
        }
    }

    /// Size of one value element.
    pub fn element_size(self) -> usize {
        match self {
            Self::String => MAX_STRING_SIZE,
            Self::Short | Self::Enum => 2,
            Self::Float | Self::Long => 4,
            Self::Char => 1,
            Self::Double => 8,
        }
    }

    /// Encoded sample size for `count` elements, 8-byte aligned.
    pub fn raw_size(self, count: DbrCount) -> usize {
        let size = self.value_offset() + count as usize * self.element_size();
        (size + 7) & !7
    }
}
