//! Sample values and their fixed-size wire encoding.

use super::{DbrCount, DbrType, Severity, MAX_STRING_SIZE};
use crate::error::{ArchiveError, Result};
use crate::time::EpicsTime;
use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

/// Value payload of a sample, one variant per element type.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    /// String elements, each at most 39 bytes.
    String(Vec<String>),
    /// 16-bit integers.
    Short(Vec<i16>),
    /// 32-bit floats.
    Float(Vec<f32>),
    /// Enumeration indices.
    Enum(Vec<u16>),
    /// Bytes.
    Char(Vec<u8>),
    /// 32-bit integers.
    Long(Vec<i32>),
    /// 64-bit floats.
    Double(Vec<f64>),
}

impl ValueData {
    /// Zero-filled payload of the given shape.
    pub fn zeroed(dbr_type: DbrType, count: DbrCount) -> Self {
        let n = count as usize;
        match dbr_type {
            DbrType::String => Self::String(vec![String::new(); n]),
            DbrType::Short => Self::Short(vec![0; n]),
            DbrType::Float => Self::Float(vec![0.0; n]),
            DbrType::Enum => Self::Enum(vec![0; n]),
            DbrType::Char => Self::Char(vec![0; n]),
            DbrType::Long => Self::Long(vec![0; n]),
            DbrType::Double => Self::Double(vec![0.0; n]),
        }
    }

    /// Element type of this payload.
    pub fn dbr_type(&self) -> DbrType {
        match self {
            Self::String(_) => DbrType::String,
            Self::Short(_) => DbrType::Short,
            Self::Float(_) => DbrType::Float,
            Self::Enum(_) => DbrType::Enum,
            Self::Char(_) => DbrType::Char,
            Self::Long(_) => DbrType::Long,
            Self::Double(_) => DbrType::Double,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::String(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Enum(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    /// Returns true if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One archived sample: status, severity, time stamp and typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Alarm status, or the repeat count for repeat markers.
    pub status: u16,
    /// Alarm severity or archiver marker.
    pub severity: Severity,
    /// Time stamp.
    pub time: EpicsTime,
    /// Value payload.
    pub data: ValueData,
}

impl Sample {
    /// Creates a zero-filled sample of the given shape.
    pub fn new(dbr_type: DbrType, count: DbrCount) -> Self {
        Self {
            status: 0,
            severity: Severity::NO_ALARM,
            time: EpicsTime::NULL,
            data: ValueData::zeroed(dbr_type, count),
        }
    }

    /// Creates a scalar double sample.
    pub fn double(time: EpicsTime, value: f64) -> Self {
        Self {
            status: 0,
            severity: Severity::NO_ALARM,
            time,
            data: ValueData::Double(vec![value]),
        }
    }

    /// Creates a value-less marker sample of the given shape.
    pub fn marker(dbr_type: DbrType, count: DbrCount, time: EpicsTime, status: u16, severity: Severity) -> Self {
        Self {
            status,
            severity,
            time,
            data: ValueData::zeroed(dbr_type, count),
        }
    }

    /// Element type.
    pub fn dbr_type(&self) -> DbrType {
        self.data.dbr_type()
    }

    /// Element count.
    pub fn count(&self) -> DbrCount {
        self.data.len().min(DbrCount::MAX as usize) as DbrCount
    }

    /// Encoded size in bytes.
    pub fn raw_size(&self) -> usize {
        self.dbr_type().raw_size(self.count())
    }

    /// Returns true if both samples have the same type and count.
    pub fn has_same_type(&self, other: &Sample) -> bool {
        self.dbr_type() == other.dbr_type() && self.count() == other.count()
    }

    /// Sets status and severity.
    pub fn set_status(&mut self, status: u16, severity: Severity) {
        self.status = status;
        self.severity = severity;
    }

    /// Returns true if the sample is an info marker without a value.
    pub fn is_info(&self) -> bool {
        self.severity.is_info()
    }

    /// Returns true for repeat-count markers.
    pub fn is_repeat(&self) -> bool {
        self.severity.is_repeat()
    }

    /// Compares only the encoded value bytes, ignoring status,
    /// severity and time stamp.
    pub fn has_same_value(&self, other: &Sample) -> bool {
        if !self.has_same_type(other) {
            return false;
        }
        let offset = self.dbr_type().value_offset();
        self.encode()[offset..] == other.encode()[offset..]
    }

    /// Element `index` as a double. Strings read as 0.
    pub fn to_double(&self, index: usize) -> Result<f64> {
        if index >= self.data.len() {
            return Err(ArchiveError::invalid(format!(
                "Invalid index {} for count {}",
                index,
                self.data.len()
            )));
        }
        Ok(match &self.data {
            ValueData::String(_) => {
                debug!("to_double called on a string sample");
                0.0
            }
            ValueData::Short(v) => v[index] as f64,
            ValueData::Float(v) => v[index] as f64,
            ValueData::Enum(v) => v[index] as f64,
            ValueData::Char(v) => v[index] as f64,
            ValueData::Long(v) => v[index] as f64,
            ValueData::Double(v) => v[index],
        })
    }

    /// Stores a double into element `index`, converting to the element type.
    /// A no-op for strings.
    pub fn set_double(&mut self, value: f64, index: usize) -> Result<()> {
        if index >= self.data.len() {
            return Err(ArchiveError::invalid(format!(
                "Invalid index {} for count {}",
                index,
                self.data.len()
            )));
        }
        match &mut self.data {
            ValueData::String(_) => debug!("set_double called on a string sample"),
            ValueData::Short(v) => v[index] = value as i16,
            ValueData::Float(v) => v[index] = value as f32,
            ValueData::Enum(v) => v[index] = value as u16,
            ValueData::Char(v) => v[index] = value as u8,
            ValueData::Long(v) => v[index] = value as i32,
            ValueData::Double(v) => v[index] = value,
        }
        Ok(())
    }

    /// Checks the first element for zero (empty for strings).
    pub fn is_zero(&self) -> bool {
        match &self.data {
            ValueData::String(v) => v.first().map_or(true, |s| s.is_empty()),
            ValueData::Short(v) => v.first().map_or(true, |x| *x == 0),
            ValueData::Float(v) => v.first().map_or(true, |x| *x == 0.0),
            ValueData::Enum(v) => v.first().map_or(true, |x| *x == 0),
            ValueData::Char(v) => v.first().map_or(true, |x| *x == 0),
            ValueData::Long(v) => v.first().map_or(true, |x| *x == 0),
            ValueData::Double(v) => v.first().map_or(true, |x| *x == 0.0),
        }
    }

    /// Encodes the sample into its fixed-size wire form.
    pub fn encode(&self) -> BytesMut {
        let size = self.raw_size();
        let dbr_type = self.dbr_type();
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u16(self.status);
        buf.put_u16(self.severity.0);
        self.time.put(&mut buf);
        buf.put_bytes(0, dbr_type.value_offset() - buf.len());
        match &self.data {
            ValueData::String(v) => {
                for s in v {
                    put_fixed_str(&mut buf, s, MAX_STRING_SIZE);
                }
            }
            ValueData::Short(v) => v.iter().for_each(|x| buf.put_i16(*x)),
            ValueData::Float(v) => v.iter().for_each(|x| buf.put_f32(*x)),
            ValueData::Enum(v) => v.iter().for_each(|x| buf.put_u16(*x)),
            ValueData::Char(v) => buf.put_slice(v),
            ValueData::Long(v) => v.iter().for_each(|x| buf.put_i32(*x)),
            ValueData::Double(v) => v.iter().for_each(|x| buf.put_f64(*x)),
        }
        buf.put_bytes(0, size.saturating_sub(buf.len()));
        buf
    }

    /// Decodes a sample of the given shape from its wire form.
    pub fn decode(bytes: &[u8], dbr_type: DbrType, count: DbrCount) -> Result<Self> {
        let size = dbr_type.raw_size(count);
        if bytes.len() < size {
            return Err(ArchiveError::invalid(format!(
                "Sample needs {} bytes, got {}",
                size,
                bytes.len()
            )));
        }
        let mut buf = &bytes[..size];
        let status = buf.get_u16();
        let severity = Severity(buf.get_u16());
        let time = EpicsTime::get(&mut buf);
        let mut buf = &bytes[dbr_type.value_offset()..size];
        let n = count as usize;
        let data = match dbr_type {
            DbrType::String => ValueData::String(
                (0..n)
                    .map(|i| fixed_str(&buf[i * MAX_STRING_SIZE..(i + 1) * MAX_STRING_SIZE]))
                    .collect(),
            ),
            DbrType::Short => ValueData::Short((0..n).map(|_| buf.get_i16()).collect()),
            DbrType::Float => ValueData::Float((0..n).map(|_| buf.get_f32()).collect()),
            DbrType::Enum => ValueData::Enum((0..n).map(|_| buf.get_u16()).collect()),
            DbrType::Char => ValueData::Char(buf[..n].to_vec()),
            DbrType::Long => ValueData::Long((0..n).map(|_| buf.get_i32()).collect()),
            DbrType::Double => ValueData::Double((0..n).map(|_| buf.get_f64()).collect()),
        };
        Ok(Self {
            status,
            severity,
            time,
            data,
        })
    }
}

/// Writes `text` NUL-padded into a field of `width` bytes, keeping room for
/// the terminator and cutting at a char boundary.
pub(crate) fn put_fixed_str(buf: &mut BytesMut, text: &str, width: usize) {
    let bytes = truncate_str(text, width - 1).as_bytes();
    buf.put_slice(bytes);
    buf.put_bytes(0, width - bytes.len());
}

/// Reads a NUL-terminated string from a fixed-width field.
pub(crate) fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Longest prefix of `text` that fits in `max` bytes.
pub(crate) fn truncate_str(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> EpicsTime {
        EpicsTime::new(1000, 500)
    }

    #[test]
    fn test_encode_layout_double() {
        let sample = Sample::double(stamp(), 1.5);
        let bytes = sample.encode();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &1000u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &500u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &1.5f64.to_be_bytes());
    }

    #[test]
    fn test_string_truncation() {
        let long = "x".repeat(60);
        let sample = Sample {
            status: 0,
            severity: Severity::NO_ALARM,
            time: stamp(),
            data: ValueData::String(vec![long]),
        };
        let decoded = Sample::decode(&sample.encode(), DbrType::String, 1).unwrap();
        match decoded.data {
            ValueData::String(v) => assert_eq!(v[0].len(), MAX_STRING_SIZE - 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_short_input_is_invalid() {
        let err = Sample::decode(&[0u8; 10], DbrType::Double, 1).unwrap_err();
        assert!(err.is_invalid());
    }

    #[test]
    fn test_has_same_value_ignores_stamp_and_status() {
        let a = Sample::double(EpicsTime::new(1, 0), 3.0);
        let mut b = Sample::double(EpicsTime::new(2, 0), 3.0);
        b.set_status(4, Severity::MINOR);
        assert!(a.has_same_value(&b));
        let c = Sample::double(EpicsTime::new(1, 0), 3.5);
        assert!(!a.has_same_value(&c));
        let mut d = Sample::new(DbrType::Long, 1);
        d.set_double(3.0, 0).unwrap();
        assert!(!a.has_same_value(&d));
    }

    #[test]
    fn test_double_conversion() {
        let mut s = Sample::new(DbrType::Short, 2);
        s.set_double(-7.9, 1).unwrap();
        assert_eq!(s.to_double(1).unwrap(), -7.0);
        assert!(s.to_double(2).unwrap_err().is_invalid());
        assert!(s.is_zero());

        let mut text = Sample::new(DbrType::String, 1);
        text.set_double(5.0, 0).unwrap();
        assert_eq!(text.to_double(0).unwrap(), 0.0);
    }
}
