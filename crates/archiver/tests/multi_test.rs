//! Integration tests for reading several archives through a master file.
//!
//! Fixture: archive A holds day 1 to day 2, archive B day 2 06:00 to day 3,
//! both for channel "pv". The master file lists B first.

use alopex_archiver::{
    Archive, ArchiveConfig, CtrlInfo, EpicsTime, MultiArchive, MultiArchiveConfig, MultiCursor,
    Sample, ValueIterator,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn day(d: u32, hour: u32) -> EpicsTime {
    EpicsTime::from_ymd_hms(2004, 1, d, hour, 0, 0).unwrap()
}

fn write_archive(dir: &Path, name: &str, samples: &[(EpicsTime, f64)]) {
    fs::create_dir_all(dir).unwrap();
    let archive = Archive::open(dir.join("directory"), ArchiveConfig::for_write()).unwrap();
    let mut channel = archive.add_channel(name).unwrap();
    let info = CtrlInfo::numeric(0, "K", 0.0, 100.0, 0.0, 0.0, 0.0, 0.0);
    for (time, value) in samples {
        let sample = Sample::double(*time, *value);
        if channel.lock_buffer(&sample, 21600.0).unwrap() == 0 {
            channel.add_buffer(&sample, &info, 21600.0, 2).unwrap();
        }
        if !channel.add_value(&sample).unwrap() {
            channel.add_buffer(&sample, &info, 21600.0, 2).unwrap();
            assert!(channel.add_value(&sample).unwrap());
        }
    }
    channel.release_buffer();
}

fn fixture() -> TempDir {
    let temp = TempDir::new().unwrap();
    let a: Vec<_> = (0..5).map(|i| (day(1, 0).add_secs(i as f64 * 21600.0), i as f64)).collect();
    let b: Vec<_> = (1..5).map(|i| (day(2, 0).add_secs(i as f64 * 21600.0), 10.0 + i as f64)).collect();
    write_archive(&temp.path().join("a"), "pv", &a);
    write_archive(&temp.path().join("a"), "only_a", &a[..1]);
    write_archive(&temp.path().join("b"), "pv", &b);
    fs::write(
        temp.path().join("master"),
        "master_version=2\n\
         2004/01/02 06:00:00 2004/01/03 00:00:00 b/directory\n\
         2004/01/01 00:00:00 2004/01/02 00:00:00 a/directory\n",
    )
    .unwrap();
    temp
}

fn open(temp: &TempDir) -> MultiArchive {
    MultiArchive::open(temp.path().join("master"), MultiArchiveConfig::new()).unwrap()
}

fn time_of(cursor: &MultiCursor) -> Option<EpicsTime> {
    cursor.value().filter(|_| cursor.is_valid()).map(|v| v.time)
}

#[test]
fn test_value_after_prefers_covering_archive() {
    let temp = fixture();
    let multi = open(&temp);
    assert_eq!(multi.archives().len(), 2);
    let channel = multi.find_by_name("pv").unwrap().unwrap();
    let mut cursor = multi.new_cursor();

    // B is listed first but does not cover day 1
    assert!(channel.value_after_time(day(1, 12), &mut cursor).unwrap());
    assert_eq!(time_of(&cursor), Some(day(1, 12)));
    assert_eq!(cursor.value().unwrap().to_double(0).unwrap(), 2.0);
    assert!(cursor.archive_dir().unwrap().ends_with("a"));
}

#[test]
fn test_iteration_continues_into_next_archive() {
    let temp = fixture();
    let multi = open(&temp);
    let channel = multi.find_by_name("pv").unwrap().unwrap();
    let mut cursor = multi.new_cursor();
    channel.value_after_time(day(1, 12), &mut cursor).unwrap();

    let mut values = Vec::new();
    while cursor.is_valid() {
        values.push(cursor.value().unwrap().to_double(0).unwrap());
        cursor.next().unwrap();
    }
    assert_eq!(values, vec![2.0, 3.0, 4.0, 11.0, 12.0, 13.0, 14.0]);

    // And back from B into A
    channel.value_after_time(day(2, 6), &mut cursor).unwrap();
    assert!(cursor.archive_dir().unwrap().ends_with("b"));
    assert!(cursor.prev().unwrap());
    assert_eq!(time_of(&cursor), Some(day(2, 0)));
    assert!(cursor.archive_dir().unwrap().ends_with("a"));
}

#[test]
fn test_gap_lookups() {
    let temp = fixture();
    let multi = open(&temp);
    let channel = multi.find_by_name("pv").unwrap().unwrap();
    let mut cursor = multi.new_cursor();

    // In the gap between A's end and B's start
    channel.value_after_time(day(2, 3), &mut cursor).unwrap();
    assert_eq!(time_of(&cursor), Some(day(2, 6)));
    channel.value_before_time(day(2, 3), &mut cursor).unwrap();
    assert_eq!(time_of(&cursor), Some(day(2, 0)));
    channel.value_near_time(day(2, 2), &mut cursor).unwrap();
    assert_eq!(time_of(&cursor), Some(day(2, 0)));
    channel.value_near_time(day(2, 5), &mut cursor).unwrap();
    assert_eq!(time_of(&cursor), Some(day(2, 6)));

    // Past everything
    assert!(!channel.value_after_time(day(5, 0), &mut cursor).unwrap());
    assert!(!cursor.is_valid());
}

#[test]
fn test_channel_ranges_are_aggregated() {
    let temp = fixture();
    let multi = open(&temp);
    let channel = multi.find_by_name("pv").unwrap().unwrap();
    assert_eq!(channel.first_time().unwrap(), day(1, 0));
    assert_eq!(channel.last_time().unwrap(), day(3, 0));

    let mut cursor = multi.new_cursor();
    assert!(channel.first_value(&mut cursor).unwrap());
    assert_eq!(time_of(&cursor), Some(day(1, 0)));
    assert!(channel.last_value(&mut cursor).unwrap());
    assert_eq!(time_of(&cursor), Some(day(3, 0)));
    // A null time means the first sample
    assert!(channel.value_after_time(EpicsTime::NULL, &mut cursor).unwrap());
    assert_eq!(time_of(&cursor), Some(day(1, 0)));

    let mut names = Vec::new();
    let mut iter = multi.find_first().unwrap();
    while let Some(channel) = iter.current() {
        names.push(channel.name());
        iter.next();
    }
    names.sort();
    assert_eq!(names, vec!["only_a", "pv"]);

    let mut iter = multi.find_by_pattern("^only").unwrap();
    assert_eq!(iter.current().unwrap().name(), "only_a");
    assert!(!iter.next());
    assert!(multi.find_by_name("missing").unwrap().is_none());
}

#[test]
fn test_version_1_window_opens_archives() {
    let temp = fixture();
    let master = temp.path().join("master1");
    fs::write(&master, "master_version=1\nb/directory\na/directory\n").unwrap();

    let all = MultiArchive::open(&master, MultiArchiveConfig::new()).unwrap();
    assert_eq!(all.archives().len(), 2);

    let late = MultiArchive::open(&master, MultiArchiveConfig::new().with_from(day(2, 12))).unwrap();
    assert_eq!(late.archives(), &[temp.path().join("b/directory")]);

    // Same answer from the version 2 bounds
    let late_v2 = MultiArchive::open(
        temp.path().join("master"),
        MultiArchiveConfig::new().with_from(day(2, 12)),
    )
    .unwrap();
    assert_eq!(late_v2.archives(), late.archives());
}

#[test]
fn test_single_archive_and_read_only() {
    let temp = fixture();
    let multi = MultiArchive::open(temp.path().join("a/directory"), MultiArchiveConfig::new()).unwrap();
    let mut channel = multi.find_by_name("pv").unwrap().unwrap();
    assert_eq!(channel.last_time().unwrap(), day(2, 0));

    let sample = Sample::double(day(4, 0), 1.0);
    assert!(channel.lock_buffer(&sample, 1.0).unwrap_err().is_invalid());
    assert!(channel.add_value(&sample).unwrap_err().is_invalid());
    assert!(channel.release_buffer().unwrap_err().is_invalid());
    assert!(multi.add_channel("new").unwrap_err().is_invalid());
}
