use std::path::{Path, PathBuf};

use crate::fs::FileSystem;
use crate::{DataFileError, Result};

pub const DATA_FILE_SUFFIX: &str = ".esld";
pub const HINT_FILE_SUFFIX: &str = ".hint";
pub const BACKUP_FILE_SUFFIX: &str = ".bak";

/// `dir/0000000001.esld`
pub fn data_path(dir: &Path, file_id: u16) -> PathBuf {
    dir.join(format!("{:010}{}", file_id, DATA_FILE_SUFFIX))
}

/// `dir/0000000001.hint`
pub fn hint_path(dir: &Path, file_id: u16) -> PathBuf {
    dir.join(format!("{:010}{}", file_id, HINT_FILE_SUFFIX))
}

/// The `.bak` sibling of `path` (suffix appended, not substituted).
pub fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(BACKUP_FILE_SUFFIX);
    PathBuf::from(os)
}

/// Parses the ten-digit file id out of a data or hint file path.
///
/// ```
/// # use datafile::file_id_from_path;
/// # use std::path::Path;
/// assert_eq!(file_id_from_path(Path::new("db/0000000002.esld")).unwrap(), 2);
/// ```
pub fn file_id_from_path(path: &Path) -> Result<u16> {
    let invalid = || DataFileError::InvalidFileName(path.display().to_string());

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let stem = name
        .strip_suffix(DATA_FILE_SUFFIX)
        .or_else(|| name.strip_suffix(HINT_FILE_SUFFIX))
        .ok_or_else(invalid)?;

    if stem.len() != 10 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    stem.parse::<u16>().map_err(|_| invalid())
}

/// A transient enumeration of the store directory: every data file, every
/// hint file, and the largest data file id found.
#[derive(Debug, Clone)]
pub struct PathSnapshot {
    pub data_files: Vec<PathBuf>,
    pub hint_files: Vec<PathBuf>,
    pub last_data_id: u16,
}

impl PathSnapshot {
    pub fn take(fs: &dyn FileSystem, dir: &Path) -> Result<Self> {
        let data_files = fs
            .glob(dir, DATA_FILE_SUFFIX)
            .map_err(DataFileError::io("glob data files"))?;
        let hint_files = fs
            .glob(dir, HINT_FILE_SUFFIX)
            .map_err(DataFileError::io("glob hint files"))?;

        let last_data_id = if !data_files.is_empty() {
            last_file_id(&data_files)?
        } else if !hint_files.is_empty() {
            // Hint files without their data files should not happen; a hint is
            // only ever written next to its sibling. Recover by placing the
            // next data file above every hint id.
            last_file_id(&hint_files)? + 1
        } else {
            0
        };

        Ok(Self {
            data_files,
            hint_files,
            last_data_id,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data_files.is_empty() && self.hint_files.is_empty()
    }
}

fn last_file_id(paths: &[PathBuf]) -> Result<u16> {
    let mut last = 0u16;
    for path in paths {
        last = last.max(file_id_from_path(path)?);
    }
    Ok(last)
}

/// A file moved aside under its `.bak` name during compaction.
///
/// Holding a `Backup` gives the compactor exactly two exits: `restore` the
/// original on failure, or `clean` the backup away on success.
#[derive(Debug)]
pub struct Backup {
    orig: PathBuf,
    bak: PathBuf,
}

impl Backup {
    /// Renames `orig` to its `.bak` sibling.
    pub fn create(fs: &dyn FileSystem, orig: &Path) -> Result<Backup> {
        let bak = backup_path(orig);
        fs.rename(orig, &bak).map_err(DataFileError::io("backup rename"))?;
        Ok(Backup {
            orig: orig.to_path_buf(),
            bak,
        })
    }

    /// Puts the original back in place.
    pub fn restore(&self, fs: &dyn FileSystem) -> Result<()> {
        fs.rename(&self.bak, &self.orig)
            .map_err(DataFileError::io("backup restore"))
    }

    /// Removes the backup file.
    pub fn clean(&self, fs: &dyn FileSystem) -> Result<()> {
        fs.remove(&self.bak).map_err(DataFileError::io("backup clean"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn filenames_are_ten_digit_ids() {
        let dir = Path::new("/db");
        assert_eq!(
            data_path(dir, 7),
            PathBuf::from("/db/0000000007.esld")
        );
        assert_eq!(
            hint_path(dir, 65535),
            PathBuf::from("/db/0000065535.hint")
        );
        assert_eq!(
            backup_path(&data_path(dir, 7)),
            PathBuf::from("/db/0000000007.esld.bak")
        );
    }

    #[test]
    fn file_id_parsing() {
        assert_eq!(file_id_from_path(Path::new("0000000001.esld")).unwrap(), 1);
        assert_eq!(
            file_id_from_path(Path::new("/a/b/0000000123.hint")).unwrap(),
            123
        );

        for bad in ["0000000001.txt", "1.esld", "000000000x.esld", "0000099999.esld"] {
            assert!(
                file_id_from_path(Path::new(bad)).is_err(),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn snapshot_of_data_and_hint_files() {
        let fs = MemFs::new();
        let dir = Path::new("/db");
        for id in [0u16, 1, 4] {
            fs.open_rw(&data_path(dir, id)).unwrap();
        }
        fs.open_rw(&hint_path(dir, 1)).unwrap();

        let snap = PathSnapshot::take(&fs, dir).unwrap();
        assert_eq!(snap.data_files.len(), 3);
        assert_eq!(snap.hint_files.len(), 1);
        assert_eq!(snap.last_data_id, 4);
        assert!(!snap.is_empty());
    }

    #[test]
    fn snapshot_of_empty_dir() {
        let fs = MemFs::new();
        let snap = PathSnapshot::take(&fs, Path::new("/db")).unwrap();
        assert!(snap.is_empty());
        assert_eq!(snap.last_data_id, 0);
    }

    #[test]
    fn hint_only_snapshot_places_data_id_above() {
        let fs = MemFs::new();
        let dir = Path::new("/db");
        fs.open_rw(&hint_path(dir, 3)).unwrap();

        let snap = PathSnapshot::take(&fs, dir).unwrap();
        assert_eq!(snap.last_data_id, 4);
    }

    #[test]
    fn backup_restore_and_clean() {
        let fs = MemFs::new();
        let dir = Path::new("/db");
        let orig = data_path(dir, 0);
        fs.open_rw(&orig).unwrap().append(b"abc").unwrap();

        let backup = Backup::create(&fs, &orig).unwrap();
        assert!(fs.open_ro(&orig).is_err());
        assert_eq!(fs.size(&backup_path(&orig)).unwrap(), 3);

        backup.restore(&fs).unwrap();
        assert_eq!(fs.size(&orig).unwrap(), 3);

        let backup = Backup::create(&fs, &orig).unwrap();
        backup.clean(&fs).unwrap();
        assert!(fs.glob(dir, BACKUP_FILE_SUFFIX).unwrap().is_empty());
        assert!(fs.open_ro(&orig).is_err());
    }
}
