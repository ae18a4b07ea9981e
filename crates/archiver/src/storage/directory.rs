//! Disk-based hash table of channel records.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bucket heads: HASH_TABLE_SIZE × u32 record offsets          │
//! │  (INVALID_OFFSET for an empty bucket)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Channel record (196 bytes), append-only                     │
//! │  - name[80], next_entry u32, last u32, first u32             │
//! │  - create / first_save / last_save time stamps               │
//! │  - last_file[40], first_file[40]                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Channel record ...                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are never moved, so their offsets identify channels. Names that
//! hash to the same bucket form a chain through `next_entry`. Removing a
//! channel only unlinks its record.

use super::{FileOffset, OpenMode, FILENAME_LENGTH, INVALID_OFFSET};
use crate::codec::sample::{fixed_str, put_fixed_str, truncate_str};
use crate::error::{ArchiveError, Result};
use crate::time::EpicsTime;
use bytes::{Buf, BufMut, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Number of hash buckets.
pub const HASH_TABLE_SIZE: u32 = 1009;

/// Size of the channel name field, including the terminator.
pub const CHANNEL_NAME_LENGTH: usize = 80;

/// Encoded channel record size.
pub const CHANNEL_RECORD_SIZE: usize = 196;

const FIRST_ENTRY_OFFSET: FileOffset = HASH_TABLE_SIZE * 4;

/// Hash bucket of a channel name.
pub fn hash(name: &str) -> u32 {
    let size = HASH_TABLE_SIZE as i64;
    let h = name
        .bytes()
        .fold(0i64, |h, b| (128 * h + (b as i8) as i64).rem_euclid(size));
    h as u32
}

/// One channel record together with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    /// Channel name.
    pub name: String,
    /// Next record in the same bucket.
    pub next_entry_offset: FileOffset,
    /// Header offset of the last buffer.
    pub last_offset: FileOffset,
    /// Header offset of the first buffer.
    pub first_offset: FileOffset,
    /// When the channel was added.
    pub create_time: EpicsTime,
    /// Time of the first sample.
    pub first_save_time: EpicsTime,
    /// Time of the last sample.
    pub last_save_time: EpicsTime,
    /// Data file basename of the last buffer.
    pub last_file: String,
    /// Data file basename of the first buffer.
    pub first_file: String,
    offset: FileOffset,
    bucket: u32,
}

impl DirectoryEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = CHANNEL_RECORD_SIZE;

    /// Creates an empty record for `name`.
    pub fn new(name: &str) -> Self {
        let name = truncate_str(name, CHANNEL_NAME_LENGTH - 1).to_string();
        let bucket = hash(&name);
        Self {
            name,
            next_entry_offset: INVALID_OFFSET,
            last_offset: INVALID_OFFSET,
            first_offset: INVALID_OFFSET,
            create_time: EpicsTime::NULL,
            first_save_time: EpicsTime::NULL,
            last_save_time: EpicsTime::NULL,
            last_file: String::new(),
            first_file: String::new(),
            offset: INVALID_OFFSET,
            bucket,
        }
    }

    /// Offset of this record in the directory file.
    pub fn offset(&self) -> FileOffset {
        self.offset
    }

    /// Hash bucket of this record.
    pub fn bucket(&self) -> u32 {
        self.bucket
    }

    /// Encodes the record.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        put_fixed_str(&mut buf, &self.name, CHANNEL_NAME_LENGTH);
        buf.put_u32(self.next_entry_offset);
        buf.put_u32(self.last_offset);
        buf.put_u32(self.first_offset);
        self.create_time.put(&mut buf);
        self.first_save_time.put(&mut buf);
        self.last_save_time.put(&mut buf);
        put_fixed_str(&mut buf, &self.last_file, FILENAME_LENGTH);
        put_fixed_str(&mut buf, &self.first_file, FILENAME_LENGTH);
        buf
    }

    /// Decodes a record read from `offset`.
    pub fn decode(bytes: &[u8], offset: FileOffset) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ArchiveError::invalid(format!(
                "Channel record needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let name = fixed_str(&bytes[..CHANNEL_NAME_LENGTH]);
        let mut buf = &bytes[CHANNEL_NAME_LENGTH..Self::SIZE];
        let next_entry_offset = buf.get_u32();
        let last_offset = buf.get_u32();
        let first_offset = buf.get_u32();
        let create_time = EpicsTime::get(&mut buf);
        let first_save_time = EpicsTime::get(&mut buf);
        let last_save_time = EpicsTime::get(&mut buf);
        let last_file = fixed_str(&buf[..FILENAME_LENGTH]);
        let first_file = fixed_str(&buf[FILENAME_LENGTH..2 * FILENAME_LENGTH]);
        let bucket = hash(&name);
        Ok(Self {
            name,
            next_entry_offset,
            last_offset,
            first_offset,
            create_time,
            first_save_time,
            last_save_time,
            last_file,
            first_file,
            offset,
            bucket,
        })
    }
}

/// The directory file of an archive.
#[derive(Debug)]
pub struct DirectoryFile {
    path: PathBuf,
    mode: OpenMode,
    file: File,
    next_free: FileOffset,
}

impl DirectoryFile {
    /// Opens the directory at `path`.
    ///
    /// In write mode a missing file is created with an empty hash table.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match mode {
            OpenMode::Read => File::open(&path),
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path),
        }
        .map_err(|source| ArchiveError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let len = file.metadata()?.len();
        let mut dir = Self {
            path,
            mode,
            file,
            next_free: FileOffset::try_from(len).unwrap_or(INVALID_OFFSET),
        };
        if len < FIRST_ENTRY_OFFSET as u64 {
            if !mode.is_write() {
                return Err(ArchiveError::invalid(format!(
                    "Missing HT in {}",
                    dir.path.display()
                )));
            }
            let mut table = BytesMut::with_capacity(FIRST_ENTRY_OFFSET as usize);
            for _ in 0..HASH_TABLE_SIZE {
                table.put_u32(INVALID_OFFSET);
            }
            dir.write_at(0, &table, "hash table")?;
            dir.next_free = FIRST_ENTRY_OFFSET;
        }
        let tail = (dir.next_free - FIRST_ENTRY_OFFSET) % CHANNEL_RECORD_SIZE as u32;
        if tail != 0 {
            warn!(
                "Suspicious directory file {} has a 'tail' of {} bytes",
                dir.path.display(),
                tail
            );
        }
        debug!("Opened directory {} ({:?})", dir.path.display(), mode);
        Ok(dir)
    }

    /// Path of the directory file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access mode.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// First record in bucket order.
    pub fn first(&mut self) -> Result<Option<DirectoryEntry>> {
        self.first_from_bucket(0)
    }

    /// Record following `entry`: the rest of its chain, then later buckets.
    pub fn next(&mut self, entry: &DirectoryEntry) -> Result<Option<DirectoryEntry>> {
        if entry.next_entry_offset != INVALID_OFFSET {
            return self.read_entry(entry.next_entry_offset).map(Some);
        }
        self.first_from_bucket(entry.bucket + 1)
    }

    /// Looks up a record by exact name.
    pub fn find(&mut self, name: &str) -> Result<Option<DirectoryEntry>> {
        let name = truncate_str(name, CHANNEL_NAME_LENGTH - 1);
        let mut offset = self.read_bucket(hash(name))?;
        while offset != INVALID_OFFSET {
            let entry = self.read_entry(offset)?;
            if entry.name == name {
                return Ok(Some(entry));
            }
            offset = entry.next_entry_offset;
        }
        Ok(None)
    }

    /// Adds a record for `name` at the end of its bucket chain.
    ///
    /// If the name exists, the existing record is returned unchanged.
    pub fn add(&mut self, name: &str) -> Result<DirectoryEntry> {
        let mut entry = DirectoryEntry::new(name);
        let head = self.read_bucket(entry.bucket)?;
        if head == INVALID_OFFSET {
            self.write_bucket(entry.bucket, self.next_free)?;
        } else {
            let mut last = self.read_entry(head)?;
            loop {
                if last.name == entry.name {
                    return Ok(last);
                }
                if last.next_entry_offset == INVALID_OFFSET {
                    break;
                }
                last = self.read_entry(last.next_entry_offset)?;
            }
            last.next_entry_offset = self.next_free;
            self.save(&last)?;
        }

        entry.offset = self.next_free;
        entry.create_time = EpicsTime::from_datetime(&chrono::Utc::now());
        self.save(&entry)?;
        self.file
            .flush()
            .map_err(|e| ArchiveError::write(format!("flush {}", self.path.display()), e))?;
        self.next_free += CHANNEL_RECORD_SIZE as u32;
        debug!("Added channel '{}' @ 0x{:X}", entry.name, entry.offset);
        Ok(entry)
    }

    /// Unlinks the record for `name` from its chain.
    ///
    /// The record bytes stay in the file. Returns false if `name` is absent.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let name = truncate_str(name, CHANNEL_NAME_LENGTH - 1);
        let bucket = hash(name);
        let mut prev: Option<DirectoryEntry> = None;
        let mut offset = self.read_bucket(bucket)?;
        while offset != INVALID_OFFSET {
            let entry = self.read_entry(offset)?;
            if entry.name == name {
                match prev {
                    None => self.write_bucket(bucket, entry.next_entry_offset)?,
                    Some(mut prev) => {
                        prev.next_entry_offset = entry.next_entry_offset;
                        self.save(&prev)?;
                    }
                }
                debug!("Removed channel '{}'", name);
                return Ok(true);
            }
            offset = entry.next_entry_offset;
            prev = Some(entry);
        }
        Ok(false)
    }

    /// Rewrites `entry` at its offset.
    pub fn save(&mut self, entry: &DirectoryEntry) -> Result<()> {
        if entry.offset == INVALID_OFFSET {
            return Err(ArchiveError::invalid(format!(
                "Channel '{}' has no directory offset",
                entry.name
            )));
        }
        self.write_at(entry.offset, &entry.encode(), "channel record")
    }

    /// Rereads `entry` from disk.
    pub fn reload(&mut self, entry: &DirectoryEntry) -> Result<DirectoryEntry> {
        self.read_entry(entry.offset)
    }

    fn first_from_bucket(&mut self, start: u32) -> Result<Option<DirectoryEntry>> {
        for bucket in start..HASH_TABLE_SIZE {
            let offset = self.read_bucket(bucket)?;
            if offset != INVALID_OFFSET {
                return self.read_entry(offset).map(Some);
            }
        }
        Ok(None)
    }

    fn read_bucket(&mut self, bucket: u32) -> Result<FileOffset> {
        let mut bytes = [0u8; 4];
        self.read_at(bucket * 4, &mut bytes, "hash table entry")?;
        Ok(u32::from_be_bytes(bytes))
    }

    fn write_bucket(&mut self, bucket: u32, offset: FileOffset) -> Result<()> {
        self.write_at(bucket * 4, &offset.to_be_bytes(), "hash table entry")
    }

    fn read_entry(&mut self, offset: FileOffset) -> Result<DirectoryEntry> {
        let mut bytes = [0u8; CHANNEL_RECORD_SIZE];
        self.read_at(offset, &mut bytes, "channel record")?;
        DirectoryEntry::decode(&bytes, offset)
    }

    fn read_at(&mut self, offset: FileOffset, buf: &mut [u8], what: &str) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|e| {
                ArchiveError::read(format!("{} @ 0x{:X} in {}", what, offset, self.path.display()), e)
            })
    }

    fn write_at(&mut self, offset: FileOffset, bytes: &[u8], what: &str) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| self.file.write_all(bytes))
            .map_err(|e| {
                ArchiveError::write(format!("{} @ 0x{:X} in {}", what, offset, self.path.display()), e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash(""), 0);
        assert_eq!(hash("A"), 65);
        assert_eq!(hash("AB"), (65 * 128 + 66) % 1009);
        assert!(hash("some:long:channel:name").lt(&HASH_TABLE_SIZE));
        // Bytes above 0x7f count as negative
        assert_eq!(hash("\u{e9}"), ((-61i64 * 128 - 87).rem_euclid(1009)) as u32);
    }

    #[test]
    fn test_record_layout() {
        let mut entry = DirectoryEntry::new("T1");
        entry.offset = FIRST_ENTRY_OFFSET;
        entry.last_file = "20030401-000000".to_string();
        entry.first_save_time = EpicsTime::new(100, 0);
        let bytes = entry.encode();
        assert_eq!(bytes.len(), CHANNEL_RECORD_SIZE);
        assert_eq!(&bytes[0..3], b"T1\0");
        assert_eq!(&bytes[80..84], &INVALID_OFFSET.to_be_bytes());
        assert_eq!(&bytes[100..104], &100u32.to_be_bytes());
        assert_eq!(&bytes[116..131], b"20030401-000000");
        assert_eq!(DirectoryEntry::decode(&bytes, FIRST_ENTRY_OFFSET).unwrap(), entry);
    }

    #[test]
    fn test_read_mode_requires_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dir");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let err = DirectoryFile::open(&path, OpenMode::Read).unwrap_err();
        assert!(err.is_invalid());
        let err = DirectoryFile::open(dir.path().join("missing"), OpenMode::Read).unwrap_err();
        assert!(matches!(err, ArchiveError::Open { .. }));
    }

    #[test]
    fn test_add_find_iterate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dir");
        let mut directory = DirectoryFile::open(&path, OpenMode::Write).unwrap();
        assert!(directory.first().unwrap().is_none());

        let a = directory.add("A").unwrap();
        let b = directory.add("B").unwrap();
        assert_eq!(a.offset(), FIRST_ENTRY_OFFSET);
        assert_eq!(b.offset(), FIRST_ENTRY_OFFSET + CHANNEL_RECORD_SIZE as u32);
        assert!(!a.create_time.is_null());

        let again = directory.add("A").unwrap();
        assert_eq!(again.offset(), a.offset());

        let first = directory.first().unwrap().unwrap();
        assert_eq!(first.name, "A");
        let second = directory.next(&first).unwrap().unwrap();
        assert_eq!(second.name, "B");
        assert!(directory.next(&second).unwrap().is_none());

        drop(directory);
        let mut directory = DirectoryFile::open(&path, OpenMode::Read).unwrap();
        assert_eq!(directory.find("B").unwrap().unwrap().offset(), b.offset());
        assert!(directory.find("C").unwrap().is_none());
    }

    #[test]
    fn test_remove_head_and_middle_of_chain() {
        let dir = TempDir::new().unwrap();
        let mut directory = DirectoryFile::open(dir.path().join("dir"), OpenMode::Write).unwrap();
        // All three land in bucket 65: 8*128+50 = 1074 and 16*128+35 = 2083
        let names = ["A", "\u{8}2", "\u{10}#"];
        assert_eq!(hash(names[0]), hash(names[1]));
        assert_eq!(hash(names[0]), hash(names[2]));
        for name in names {
            directory.add(name).unwrap();
        }
        assert!(directory.remove(names[1]).unwrap());
        assert!(directory.find(names[1]).unwrap().is_none());
        assert!(directory.find(names[0]).unwrap().is_some());
        assert!(directory.remove(names[0]).unwrap());
        assert!(directory.find(names[0]).unwrap().is_none());
        assert!(!directory.remove(names[0]).unwrap());
        assert!(directory.find(names[2]).unwrap().is_some());
    }
}
