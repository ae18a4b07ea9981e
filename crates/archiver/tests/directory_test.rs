//! Integration tests for the on-disk channel directory.

use alopex_archiver::storage::directory::{hash, CHANNEL_RECORD_SIZE};
use alopex_archiver::storage::{DirectoryFile, HASH_TABLE_SIZE};
use alopex_archiver::OpenMode;
use std::collections::BTreeSet;
use tempfile::TempDir;

/// Three names that land in the same bucket.
const COLLIDING: [&str; 3] = ["A", "\u{8}2", "\u{10}#"];

fn all_names(dir: &mut DirectoryFile) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut entry = dir.first().unwrap();
    while let Some(e) = entry {
        names.insert(e.name.clone());
        entry = dir.next(&e).unwrap();
    }
    names
}

#[test]
fn test_collisions_chain_and_stay_findable() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("directory");
    let bucket = hash(COLLIDING[0]);
    assert!(COLLIDING.iter().all(|n| hash(n) == bucket));
    assert_ne!(hash("unrelated"), bucket);

    {
        let mut dir = DirectoryFile::open(&path, OpenMode::Write).unwrap();
        for name in COLLIDING {
            dir.add(name).unwrap();
        }
        dir.add("unrelated").unwrap();
    }

    let mut dir = DirectoryFile::open(&path, OpenMode::Read).unwrap();
    for name in COLLIDING.iter().chain(["unrelated"].iter()) {
        let entry = dir.find(name).unwrap().unwrap();
        assert_eq!(entry.name, *name);
    }
    assert!(dir.find("missing").unwrap().is_none());
    assert_eq!(all_names(&mut dir).len(), 4);

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len, HASH_TABLE_SIZE as u64 * 4 + 4 * CHANNEL_RECORD_SIZE as u64);
}

#[test]
fn test_remove_from_middle_of_chain() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("directory");
    let mut dir = DirectoryFile::open(&path, OpenMode::Write).unwrap();
    for name in COLLIDING {
        dir.add(name).unwrap();
    }
    assert!(dir.remove(COLLIDING[1]).unwrap());
    assert!(dir.find(COLLIDING[1]).unwrap().is_none());
    assert!(dir.find(COLLIDING[0]).unwrap().is_some());
    assert!(dir.find(COLLIDING[2]).unwrap().is_some());

    let expected: BTreeSet<String> = [COLLIDING[0], COLLIDING[2]].iter().map(|s| s.to_string()).collect();
    assert_eq!(all_names(&mut dir), expected);
}

#[test]
fn test_saved_entry_round_trips() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("directory");
    let mut dir = DirectoryFile::open(&path, OpenMode::Write).unwrap();
    let mut entry = dir.add("PV:temp").unwrap();
    entry.first_file = "20040101-000000".to_string();
    entry.last_file = "20040201-000000".to_string();
    entry.first_offset = 0x1234;
    entry.last_offset = 0x5678;
    dir.save(&entry).unwrap();

    let reread = DirectoryFile::open(&path, OpenMode::Read)
        .unwrap()
        .find("PV:temp")
        .unwrap()
        .unwrap();
    assert_eq!(reread, entry);
}

#[test]
fn test_empty_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("directory");
    let mut dir = DirectoryFile::open(&path, OpenMode::Write).unwrap();
    assert!(dir.first().unwrap().is_none());
    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        HASH_TABLE_SIZE as u64 * 4
    );

    // Truncated hash table is refused for reading
    std::fs::write(&path, [0u8; 16]).unwrap();
    assert!(DirectoryFile::open(&path, OpenMode::Read).unwrap_err().is_invalid());
}
