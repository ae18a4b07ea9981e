//! Master file parsing.
//!
//! A master file lists sub-archives, most recent first:
//!
//! ```text
//! master_version=2
//! # start             end                 directory file
//! 2004/01/02 00:00:00 2004/01/03 00:00:00 /arch/2004_01_02/directory
//! 2004/01/01 00:00:00 2004/01/02 00:00:00 /arch/2004_01_01/directory
//! ```
//!
//! Version 1 lists only the paths. Any file that does not start with
//! `master_version` is taken to be the directory file of a single archive.

use super::MultiArchiveConfig;
use crate::archive::{Archive, ArchiveConfig};
use crate::error::{ArchiveError, Result};
use crate::time::EpicsTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MAGIC: &str = "master_version";

/// Reads `master` and returns the sub-archives overlapping the window of
/// `config`, in listed order.
pub(crate) fn read_master(master: &Path, config: &MultiArchiveConfig) -> Result<Vec<PathBuf>> {
    let text = fs::read(master).map_err(|source| open_error(master, source))?;
    if text.len() < MAGIC.len() {
        return Err(open_error(master, invalid_data("too small for a master file")));
    }
    if !text.starts_with(MAGIC.as_bytes()) {
        debug!("{} is not a master file, using it as the archive", master.display());
        return Ok(vec![master.to_path_buf()]);
    }
    let text = String::from_utf8_lossy(&text);
    let base = master.parent().unwrap_or_else(|| Path::new(""));

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end()))
        .filter(|(_, line)| !line.trim_start().is_empty() && !line.trim_start().starts_with('#'));

    let version = lines
        .next()
        .and_then(|(_, line)| line.split_once('='))
        .filter(|(key, _)| key.trim() == MAGIC)
        .map(|(_, value)| value.trim().to_string());

    let mut archives = Vec::new();
    match version.as_deref() {
        Some("1") => {
            for (_, line) in lines {
                let Some(path) = existing(base, line.trim(), master) else {
                    continue;
                };
                if config.is_unbounded() || overlaps_window(&path, config)? {
                    archives.push(path);
                }
            }
        }
        Some("2") => {
            for (line_no, line) in lines {
                let start = line.get(0..19).and_then(EpicsTime::parse);
                let end = line.get(20..39).and_then(EpicsTime::parse);
                let (Some(start), Some(end)) = (start, end) else {
                    warn!("Invalid time stamp in master file '{}' line {}", master.display(), line_no);
                    continue;
                };
                if !config.overlaps(start, end) {
                    continue;
                }
                if let Some(path) = existing(base, line.get(40..).unwrap_or("").trim(), master) {
                    archives.push(path);
                }
            }
        }
        Some(other) => {
            return Err(open_error(
                master,
                invalid_data(&format!("unknown master file version {}", other)),
            ));
        }
        None => {
            return Err(open_error(master, invalid_data("missing master_version")));
        }
    }
    for path in &archives {
        debug!("Sub-archive {}", path.display());
    }
    Ok(archives)
}

fn existing(base: &Path, entry: &str, master: &Path) -> Option<PathBuf> {
    let path = base.join(entry);
    if entry.is_empty() || !path.is_file() {
        warn!("Master file '{}' lists missing archive '{}'", master.display(), entry);
        return None;
    }
    Some(path)
}

/// Opens a version 1 entry to find the time range it covers.
fn overlaps_window(path: &Path, config: &MultiArchiveConfig) -> Result<bool> {
    let archive = Archive::open(path, ArchiveConfig::default())?;
    let mut start = EpicsTime::NULL;
    let mut end = EpicsTime::NULL;
    let mut channels = archive.find_first()?;
    while let Some(channel) = channels.current() {
        let first = channel.first_time();
        if first.is_valid() && (start.is_null() || first < start) {
            start = first;
        }
        end = end.max(channel.last_time());
        channels.next()?;
    }
    Ok(config.overlaps(start, end))
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn open_error(path: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::Open {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not a master file").unwrap();
        path
    }

    fn t(text: &str) -> EpicsTime {
        EpicsTime::parse(text).unwrap()
    }

    #[test]
    fn test_plain_archive_path() {
        let dir = TempDir::new().unwrap();
        let path = touch(&dir, "directory");
        let archives = read_master(&path, &MultiArchiveConfig::default()).unwrap();
        assert_eq!(archives, vec![path]);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_master(&dir.path().join("nope"), &MultiArchiveConfig::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::Open { .. }));
    }

    #[test]
    fn test_version_2_window() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "b/directory");
        touch(&dir, "a/directory");
        let master = dir.path().join("master");
        fs::write(
            &master,
            "master_version=2\n\
             # newest first\n\
             \n\
             2004/01/02 00:00:00 2004/01/03 00:00:00 b/directory\n\
             2004/01/01 00:00:00 2004/01/02 00:00:00 a/directory\n\
             garbage line\n\
             2004/01/04 00:00:00 2004/01/05 00:00:00 gone/directory\n",
        )
        .unwrap();

        let all = read_master(&master, &MultiArchiveConfig::default()).unwrap();
        assert_eq!(all, vec![dir.path().join("b/directory"), dir.path().join("a/directory")]);

        let config = MultiArchiveConfig::default().with_from(t("2004/01/02 12:00:00"));
        let late = read_master(&master, &config).unwrap();
        assert_eq!(late, vec![dir.path().join("b/directory")]);

        let config = MultiArchiveConfig::default().with_to(t("2004/01/01 12:00:00"));
        let early = read_master(&master, &config).unwrap();
        assert_eq!(early, vec![dir.path().join("a/directory")]);
    }

    #[test]
    fn test_version_1_skips_missing() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a/directory");
        let master = dir.path().join("master");
        fs::write(&master, "master_version=1\nmissing/directory\na/directory\n").unwrap();
        let archives = read_master(&master, &MultiArchiveConfig::default()).unwrap();
        assert_eq!(archives, vec![dir.path().join("a/directory")]);
    }

    #[test]
    fn test_bad_version() {
        let dir = TempDir::new().unwrap();
        let master = dir.path().join("master");
        fs::write(&master, "master_version=3\n").unwrap();
        assert!(matches!(
            read_master(&master, &MultiArchiveConfig::default()),
            Err(ArchiveError::Open { .. })
        ));
        fs::write(&master, "master_version_without_value\n").unwrap();
        assert!(read_master(&master, &MultiArchiveConfig::default()).is_err());
    }
}
