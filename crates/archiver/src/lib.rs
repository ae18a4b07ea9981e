//! Alopex Archiver - channel archive storage engine
//!
//! Stores time-stamped samples of named channels in append-mostly binary
//! files: a hashed directory file maps channel names to chains of
//! fixed-capacity sample buffers spread over time-partitioned data files.
//!
//! # Components
//!
//! - [`Archive`] / [`Channel`]: open an archive, look up and add channels,
//!   append samples
//! - [`Cursor`]: walk the raw samples of one channel in either direction
//! - [`iter`]: repeat expansion, linear interpolation, bucket reduction and
//!   info filtering on top of any [`ValueIterator`]
//! - [`MultiArchive`]: read several archives listed in a master file as one
//! - [`codec`]: sample and CtrlInfo encoding, value text formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_archiver::{Archive, ArchiveConfig, CtrlInfo, EpicsTime, Sample, ValueIterator};
//!
//! let archive = Archive::open(dir.join("directory"), ArchiveConfig::for_write())?;
//! let mut channel = archive.add_channel("T1")?;
//! let info = CtrlInfo::numeric(2, "V", 0.0, 10.0, 0.0, 0.0, 0.0, 0.0);
//!
//! let sample = Sample::double(EpicsTime::new(100, 0), 1.0);
//! if channel.lock_buffer(&sample, 1.0)? == 0 {
//!     channel.add_buffer(&sample, &info, 1.0, 64)?;
//! }
//! channel.add_value(&sample)?;
//! channel.release_buffer();
//!
//! let mut cursor = archive.new_cursor();
//! channel.value_after_time(EpicsTime::new(50, 0), &mut cursor)?;
//! while cursor.is_valid() {
//!     println!("{:?}", cursor.value());
//!     cursor.next()?;
//! }
//! ```

#![deny(missing_docs)]

pub mod archive;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod iter;
pub mod multi;
pub mod storage;
pub mod time;

pub use archive::{Archive, ArchiveConfig, Channel, ChannelIter, FilePartitioning, OpenMode};
pub use codec::{CtrlInfo, DbrCount, DbrType, Sample, Severity};
pub use cursor::{Cursor, Position};
pub use error::{ArchiveError, Result};
pub use iter::ValueIterator;
pub use multi::{MultiArchive, MultiArchiveConfig, MultiChannel, MultiCursor};
pub use time::EpicsTime;
