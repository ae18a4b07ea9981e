//! Data buffer header.
//!
//! ## Layout (152 bytes, big-endian)
//!
//! ```text
//! ┌────────────┬─────────────┬─────────────┬──────────────┬─────────────┐
//! │ dir u32    │ next u32    │ prev u32    │ curr u32     │ num u32     │
//! ├────────────┼─────────────┼─────────────┼──────────────┼─────────────┤
//! │ config u32 │ buf_size u32│ buf_free u32│ type u16     │ count u16   │
//! ├────────────┴─────────────┴─────────────┴──────────────┴─────────────┤
//! │ pad[4] │ period f64 │ begin_time │ next_file_time │ end_time        │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │ prev_file[40]                 │ next_file[40]                        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `curr` is the write position relative to the first sample byte, which
//! follows the header directly. `buf_size` covers header plus sample area;
//! its last four bytes hold [`BUFFER_MARKER`] until samples overwrite them.

use super::{FileOffset, FILENAME_LENGTH};
use crate::codec::sample::{fixed_str, put_fixed_str};
use crate::codec::{DbrCount, DbrType};
use crate::error::{ArchiveError, Result};
use crate::time::EpicsTime;
use bytes::{Buf, BufMut, BytesMut};

/// Encoded header size.
pub const DATA_HEADER_SIZE: usize = 152;

/// Sentinel written at the end of a freshly allocated buffer.
pub const BUFFER_MARKER: u32 = 0x0eff_aced;

/// Upper bound for samples in one buffer, used for chunking.
pub const MAX_SAMPLES_PER_HEADER: usize = 4000;

/// Descriptor of one sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DataHeader {
    /// Offset of the owning channel record in the directory file.
    pub dir_offset: FileOffset,
    /// Offset of the next header in `next_file`.
    pub next_offset: FileOffset,
    /// Offset of the previous header in `prev_file`.
    pub prev_offset: FileOffset,
    /// Write position relative to the data area.
    pub curr_offset: u32,
    /// Number of samples written.
    pub num_samples: u32,
    /// Offset of the CtrlInfo block in this file.
    pub config_offset: FileOffset,
    /// Header plus data area size.
    pub buf_size: u32,
    /// Unused bytes in the data area.
    pub buf_free: u32,
    /// Element type of all samples.
    pub dbr_type: DbrType,
    /// Element count of all samples.
    pub count: DbrCount,
    /// Sampling period in seconds. Negative marks a broken buffer.
    pub period: f64,
    /// Time of the first sample.
    pub begin_time: EpicsTime,
    /// Time at which samples go to the next partition file.
    pub next_file_time: EpicsTime,
    /// Time of the last sample.
    pub end_time: EpicsTime,
    /// Basename of the file holding the previous buffer, empty if none.
    pub prev_file: String,
    /// Basename of the file holding the next buffer, empty if none.
    pub next_file: String,
}

impl DataHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = DATA_HEADER_SIZE;

    /// Creates an empty, unlinked header for samples of the given shape.
    pub fn new(dbr_type: DbrType, count: DbrCount, period: f64) -> Self {
        Self {
            dir_offset: 0,
            next_offset: 0,
            prev_offset: 0,
            curr_offset: 0,
            num_samples: 0,
            config_offset: 0,
            buf_size: 0,
            buf_free: 0,
            dbr_type,
            count,
            period,
            begin_time: EpicsTime::NULL,
            next_file_time: EpicsTime::NULL,
            end_time: EpicsTime::NULL,
            prev_file: String::new(),
            next_file: String::new(),
        }
    }

    /// Encoded size of one sample in this buffer.
    pub fn sample_size(&self) -> usize {
        self.dbr_type.raw_size(self.count)
    }

    /// Returns true if another buffer follows this one.
    pub fn has_next(&self) -> bool {
        !self.next_file.is_empty()
    }

    /// Returns true if another buffer precedes this one.
    pub fn has_prev(&self) -> bool {
        !self.prev_file.is_empty()
    }

    /// Encodes the header.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u32(self.dir_offset);
        buf.put_u32(self.next_offset);
        buf.put_u32(self.prev_offset);
        buf.put_u32(self.curr_offset);
        buf.put_u32(self.num_samples);
        buf.put_u32(self.config_offset);
        buf.put_u32(self.buf_size);
        buf.put_u32(self.buf_free);
        buf.put_u16(self.dbr_type.as_u16());
        buf.put_u16(self.count);
        buf.put_bytes(0, 4);
        buf.put_f64(self.period);
        self.begin_time.put(&mut buf);
        self.next_file_time.put(&mut buf);
        self.end_time.put(&mut buf);
        put_fixed_str(&mut buf, &self.prev_file, FILENAME_LENGTH);
        put_fixed_str(&mut buf, &self.next_file, FILENAME_LENGTH);
        buf
    }

    /// Decodes a header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ArchiveError::invalid(format!(
                "DataHeader needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut buf = &bytes[..Self::SIZE];
        let dir_offset = buf.get_u32();
        let next_offset = buf.get_u32();
        let prev_offset = buf.get_u32();
        let curr_offset = buf.get_u32();
        let num_samples = buf.get_u32();
        let config_offset = buf.get_u32();
        let buf_size = buf.get_u32();
        let buf_free = buf.get_u32();
        let type_code = buf.get_u16();
        let dbr_type = DbrType::from_u16(type_code)
            .ok_or_else(|| ArchiveError::invalid(format!("Unknown DBR type {}", type_code)))?;
        let count = buf.get_u16();
        buf.advance(4);
        let period = buf.get_f64();
        let begin_time = EpicsTime::get(&mut buf);
        let next_file_time = EpicsTime::get(&mut buf);
        let end_time = EpicsTime::get(&mut buf);
        let prev_file = fixed_str(&buf[..FILENAME_LENGTH]);
        let next_file = fixed_str(&buf[FILENAME_LENGTH..2 * FILENAME_LENGTH]);
        Ok(Self {
            dir_offset,
            next_offset,
            prev_offset,
            curr_offset,
            num_samples,
            config_offset,
            buf_size,
            buf_free,
            dbr_type,
            count,
            period,
            begin_time,
            next_file_time,
            end_time,
            prev_file,
            next_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut header = DataHeader::new(DbrType::Double, 1, 0.5);
        header.dir_offset = 4036;
        header.buf_size = 152 + 240;
        header.next_file_time = EpicsTime::new(3600, 0);
        header.next_file = "20030401-000000".to_string();
        let bytes = header.encode();
        assert_eq!(bytes.len(), DATA_HEADER_SIZE);
        assert_eq!(&bytes[0..4], &4036u32.to_be_bytes());
        assert_eq!(&bytes[32..34], &20u16.to_be_bytes());
        assert_eq!(&bytes[40..48], &0.5f64.to_be_bytes());
        assert_eq!(&bytes[56..60], &3600u32.to_be_bytes());
        assert_eq!(&bytes[112..127], b"20030401-000000");
        assert_eq!(DataHeader::decode(&bytes).unwrap(), header);
        assert!(header.has_next());
        assert!(!header.has_prev());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = DataHeader::new(DbrType::Short, 1, 1.0).encode();
        bytes[32..34].copy_from_slice(&99u16.to_be_bytes());
        assert!(DataHeader::decode(&bytes).unwrap_err().is_invalid());
        assert!(DataHeader::decode(&bytes[..100]).unwrap_err().is_invalid());
    }
}
