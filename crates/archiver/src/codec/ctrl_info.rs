//! Control metadata ("CtrlInfo") shared by the samples of a buffer.
//!
//! ## Block layout
//!
//! ```text
//! ┌───────────┬───────────┬──────────────────────────────────────────────┐
//! │ size u16  │ type u16  │ body                                         │
//! ├───────────┴───────────┼──────────────────────────────────────────────┤
//! │ Numeric (type 1)      │ disp_high disp_low low_warn low_alarm        │
//! │                       │ high_warn high_alarm (f32 each), prec i32,   │
//! │                       │ units NUL-terminated                         │
//! ├───────────────────────┼──────────────────────────────────────────────┤
//! │ Enumerated (type 2)   │ num_states i16, pad i16,                     │
//! │                       │ NUL-separated state labels                   │
//! └───────────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! `size` covers the whole block including the size and type fields.

use super::sample::fixed_str;
use crate::error::{ArchiveError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Read;
use tracing::warn;

/// Size of the fixed block part: size + type + the larger union member.
const FIXED_SIZE: usize = 36;

/// Offset of the first enumeration label.
const STATES_OFFSET: usize = 8;

/// Offset of the unit string.
const UNITS_OFFSET: usize = 32;

/// Wire code of each CtrlInfo kind.
const TYPE_INVALID: u16 = 0;
const TYPE_NUMERIC: u16 = 1;
const TYPE_ENUMERATED: u16 = 2;

/// Display, alarm and warning ranges plus precision and units.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumericInfo {
    /// Display precision (digits after the decimal point).
    pub prec: i32,
    /// Engineering units.
    pub units: String,
    /// Lower display limit.
    pub disp_low: f32,
    /// Upper display limit.
    pub disp_high: f32,
    /// Lower alarm limit.
    pub low_alarm: f32,
    /// Lower warning limit.
    pub low_warn: f32,
    /// Upper warning limit.
    pub high_warn: f32,
    /// Upper alarm limit.
    pub high_alarm: f32,
}

/// Control metadata of a channel epoch.
#[derive(Debug, Clone, Default)]
pub enum CtrlInfo {
    /// No usable metadata.
    #[default]
    Invalid,
    /// Numeric channel.
    Numeric(NumericInfo),
    /// Enumerated channel with its state labels.
    Enumerated(Vec<String>),
}

impl CtrlInfo {
    /// Smallest size field a readable block may carry.
    pub const MIN_SIZE: usize = 4 + 6;

    /// Creates numeric metadata.
    #[allow(clippy::too_many_arguments)]
    pub fn numeric(
        prec: i32,
        units: impl Into<String>,
        disp_low: f32,
        disp_high: f32,
        low_alarm: f32,
        low_warn: f32,
        high_warn: f32,
        high_alarm: f32,
    ) -> Self {
        Self::Numeric(NumericInfo {
            prec,
            units: units.into(),
            disp_low,
            disp_high,
            low_alarm,
            low_warn,
            high_warn,
            high_alarm,
        })
    }

    /// Creates enumerated metadata from state labels.
    pub fn enumerated<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enumerated(states.into_iter().map(Into::into).collect())
    }

    /// Returns true unless this is [`CtrlInfo::Invalid`].
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Display precision, 0 for non-numeric metadata.
    pub fn precision(&self) -> i32 {
        match self {
            Self::Numeric(info) => info.prec,
            _ => 0,
        }
    }

    /// Engineering units, empty for non-numeric metadata.
    pub fn units(&self) -> &str {
        match self {
            Self::Numeric(info) => &info.units,
            _ => "",
        }
    }

    /// Number of enumeration states.
    pub fn num_states(&self) -> usize {
        match self {
            Self::Enumerated(states) => states.len(),
            _ => 0,
        }
    }

    /// Label of `state`, or `"<Undef: N>"` when there is none.
    pub fn state(&self, state: usize) -> String {
        match self {
            Self::Enumerated(states) if state < states.len() => states[state].clone(),
            _ => format!("<Undef: {}>", state),
        }
    }

    /// Matches the first state label that prefixes `text`.
    ///
    /// Returns the state index and the remaining text.
    pub fn parse_state<'a>(&self, text: &'a str) -> Option<(usize, &'a str)> {
        let Self::Enumerated(states) = self else {
            return None;
        };
        states
            .iter()
            .enumerate()
            .find(|(_, label)| text.starts_with(label.as_str()))
            .map(|(i, label)| (i, &text[label.len()..]))
    }

    /// Formats a number with this metadata's precision.
    pub fn format_double(&self, value: f64) -> Result<String> {
        let Self::Numeric(info) = self else {
            return Err(ArchiveError::invalid("format_double: CtrlInfo is not numeric"));
        };
        let prec = info.prec.clamp(0, 17) as usize;
        if value.is_finite() && value.abs() >= 1e16 {
            Ok(format!("{:.*e}", prec, value))
        } else {
            Ok(format!("{:.*}", prec, value))
        }
    }

    /// Size field of the encoded block.
    pub fn encoded_size(&self) -> usize {
        match self {
            Self::Invalid => 4,
            Self::Numeric(info) => FIXED_SIZE + info.units.len(),
            Self::Enumerated(states) => FIXED_SIZE + states.iter().map(|s| s.len() + 1).sum::<usize>(),
        }
    }

    /// Encodes the block. Invalid metadata cannot be written.
    pub fn encode(&self) -> Result<BytesMut> {
        let size = self.encoded_size();
        if size > u16::MAX as usize {
            return Err(ArchiveError::invalid(format!("CtrlInfo too big: {}", size)));
        }
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u16(size as u16);
        match self {
            Self::Invalid => return Err(ArchiveError::invalid("Cannot write invalid CtrlInfo")),
            Self::Numeric(info) => {
                buf.put_u16(TYPE_NUMERIC);
                buf.put_f32(info.disp_high);
                buf.put_f32(info.disp_low);
                buf.put_f32(info.low_warn);
                buf.put_f32(info.low_alarm);
                buf.put_f32(info.high_warn);
                buf.put_f32(info.high_alarm);
                buf.put_i32(info.prec);
                buf.put_slice(info.units.as_bytes());
            }
            Self::Enumerated(states) => {
                buf.put_u16(TYPE_ENUMERATED);
                buf.put_i16(states.len().min(i16::MAX as usize) as i16);
                buf.put_i16(0);
                for state in states {
                    buf.put_slice(state.as_bytes());
                    buf.put_u8(0);
                }
            }
        }
        buf.put_bytes(0, size.saturating_sub(buf.len()));
        Ok(buf)
    }

    /// Decodes a complete block whose size field has already been checked.
    pub fn decode(block: &[u8]) -> Result<Self> {
        if block.len() < Self::MIN_SIZE {
            return Err(ArchiveError::invalid(format!("CtrlInfo too small: {}", block.len())));
        }
        let mut buf = block;
        let size = (buf.get_u16() as usize).min(block.len());
        let kind = buf.get_u16();
        match kind {
            TYPE_NUMERIC => {
                if size < UNITS_OFFSET {
                    return Err(ArchiveError::invalid(format!(
                        "Numeric CtrlInfo too small: {}",
                        size
                    )));
                }
                let disp_high = buf.get_f32();
                let disp_low = buf.get_f32();
                let low_warn = buf.get_f32();
                let low_alarm = buf.get_f32();
                let high_warn = buf.get_f32();
                let high_alarm = buf.get_f32();
                let prec = buf.get_i32();
                // Old archives may lack the terminator; then the units run
                // to the end of the block.
                let units = fixed_str(&block[UNITS_OFFSET..size]);
                Ok(Self::Numeric(NumericInfo {
                    prec,
                    units,
                    disp_low,
                    disp_high,
                    low_alarm,
                    low_warn,
                    high_warn,
                    high_alarm,
                }))
            }
            TYPE_ENUMERATED => {
                let num_states = buf.get_i16().max(0) as usize;
                let labels = block.get(STATES_OFFSET..size).unwrap_or_default();
                let states = labels
                    .split(|b| *b == 0)
                    .take(num_states)
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect::<Vec<_>>();
                if states.len() < num_states {
                    warn!(
                        "CtrlInfo lists {} states but holds only {}",
                        num_states,
                        states.len()
                    );
                }
                Ok(Self::Enumerated(states))
            }
            other => Err(ArchiveError::invalid(format!(
                "Invalid CtrlInfo, type {}, size {}",
                other, size
            ))),
        }
    }

    /// Reads a block from `reader`, positioned at the size field.
    ///
    /// `current` is the metadata the caller holds so far. A block whose size
    /// field is below [`CtrlInfo::MIN_SIZE`] turns into an empty enumeration
    /// when `current` is enumerated; otherwise it is reported as `Invalid`
    /// and the caller decides whether to keep `current`.
    pub fn read_from<R: Read>(reader: &mut R, current: &CtrlInfo) -> Result<Self> {
        let mut size_buf = [0u8; 2];
        reader
            .read_exact(&mut size_buf)
            .map_err(|e| ArchiveError::read("size of CtrlInfo", e))?;
        let size = u16::from_be_bytes(size_buf) as usize;
        if size < Self::MIN_SIZE {
            if matches!(current, Self::Enumerated(_)) {
                warn!("CtrlInfo too small: {}, forcing to empty enum for compatibility", size);
                return Ok(Self::Enumerated(Vec::new()));
            }
            return Err(ArchiveError::invalid(format!("CtrlInfo too small: {}", size)));
        }
        let mut block = vec![0u8; size];
        block[..2].copy_from_slice(&size_buf);
        reader
            .read_exact(&mut block[2..])
            .map_err(|e| ArchiveError::read("remainder of CtrlInfo", e))?;
        Self::decode(&block)
    }

    /// Wire type code.
    pub fn type_code(&self) -> u16 {
        match self {
            Self::Invalid => TYPE_INVALID,
            Self::Numeric(_) => TYPE_NUMERIC,
            Self::Enumerated(_) => TYPE_ENUMERATED,
        }
    }
}

/// Equality is byte equality of the encoded blocks.
impl PartialEq for CtrlInfo {
    fn eq(&self, other: &Self) -> bool {
        match (self.encode(), other.encode()) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.type_code() == other.type_code() && !self.is_valid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volts() -> CtrlInfo {
        CtrlInfo::numeric(2, "V", 0.0, 10.0, 0.5, 1.0, 9.0, 9.5)
    }

    #[test]
    fn test_numeric_block_layout() {
        let bytes = volts().encode().unwrap();
        assert_eq!(bytes.len(), 37);
        assert_eq!(&bytes[0..2], &37u16.to_be_bytes());
        assert_eq!(&bytes[2..4], &1u16.to_be_bytes());
        assert_eq!(&bytes[4..8], &10.0f32.to_be_bytes());
        assert_eq!(&bytes[28..32], &2i32.to_be_bytes());
        assert_eq!(&bytes[32..34], b"V\0");
        assert_eq!(CtrlInfo::decode(&bytes).unwrap(), volts());
    }

    #[test]
    fn test_enumerated_block_layout() {
        let info = CtrlInfo::enumerated(["Off", "On"]);
        let bytes = info.encode().unwrap();
        assert_eq!(bytes.len(), 36 + 4 + 3);
        assert_eq!(&bytes[4..6], &2i16.to_be_bytes());
        assert_eq!(&bytes[8..15], b"Off\0On\0");
        assert_eq!(CtrlInfo::decode(&bytes).unwrap(), info);
    }

    #[test]
    fn test_unterminated_units_accepted() {
        let mut bytes = volts().encode().unwrap().to_vec();
        // Size that ends right after the unit character, no NUL
        bytes.truncate(33);
        bytes[0..2].copy_from_slice(&33u16.to_be_bytes());
        let info = CtrlInfo::decode(&bytes).unwrap();
        assert_eq!(info.units(), "V");
    }

    #[test]
    fn test_read_undersized_block() {
        let tiny = 6u16.to_be_bytes();
        let enum_info = CtrlInfo::enumerated(["A"]);
        let read = CtrlInfo::read_from(&mut &tiny[..], &enum_info).unwrap();
        assert_eq!(read, CtrlInfo::Enumerated(vec![]));

        let err = CtrlInfo::read_from(&mut &tiny[..], &volts()).unwrap_err();
        assert!(err.is_invalid());
    }

    #[test]
    fn test_unknown_type_is_invalid() {
        let mut bytes = volts().encode().unwrap().to_vec();
        bytes[2..4].copy_from_slice(&7u16.to_be_bytes());
        assert!(CtrlInfo::decode(&bytes).unwrap_err().is_invalid());
    }

    #[test]
    fn test_states_and_formatting() {
        let info = CtrlInfo::enumerated(["Off", "On"]);
        assert_eq!(info.state(1), "On");
        assert_eq!(info.state(5), "<Undef: 5>");
        assert_eq!(info.parse_state("On, Off"), Some((1, ", Off")));
        assert_eq!(info.parse_state("Maybe"), None);
        assert!(info.format_double(1.0).unwrap_err().is_invalid());
        assert_eq!(volts().format_double(2.0).unwrap(), "2.00");
    }

    #[test]
    fn test_equality_is_bytewise() {
        assert_eq!(volts(), volts());
        assert_ne!(volts(), CtrlInfo::numeric(3, "V", 0.0, 10.0, 0.5, 1.0, 9.0, 9.5));
        assert_eq!(CtrlInfo::Invalid, CtrlInfo::Invalid);
        assert_ne!(CtrlInfo::Invalid, volts());
    }
}
