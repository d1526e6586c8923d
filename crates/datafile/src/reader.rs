use keydir::Descriptor;
use std::path::Path;

use crate::entry::{Entry, ENTRY_HEADER_BYTES};
use crate::fs::FileSystem;
use crate::hint::HintRecord;
use crate::{DataFileError, Result};

// Capacity guess for scan results: a typical entry runs about 30 bytes
// (header plus short key and value).
const ENTRY_SIZE_ASSUMPTION: u64 = 30;

fn estimate_entries(bytes: u64) -> usize {
    if bytes < ENTRY_SIZE_ASSUMPTION {
        return 0;
    }
    (bytes / ENTRY_SIZE_ASSUMPTION) as usize + 1
}

/// Sequentially parses an entire data file, yielding every entry together
/// with the descriptor addressing it.
///
/// Every entry is CRC-validated; corruption anywhere fails the whole scan,
/// which makes a damaged file fatal to recovery rather than silently
/// shortening it.
pub fn read_data_file(
    fs: &dyn FileSystem,
    path: &Path,
    file_id: u16,
) -> Result<Vec<(Entry, Descriptor)>> {
    let mut file = fs.open_ro(path).map_err(DataFileError::io("open data file"))?;
    let size = file.len().map_err(DataFileError::io("stat data file"))?;

    let mut buf = vec![0u8; size as usize];
    file.read_at(0, &mut buf)
        .map_err(DataFileError::io("read data file"))?;

    let mut out = Vec::with_capacity(estimate_entries(size));
    let mut pos = 0usize;
    while pos < buf.len() {
        let (entry, consumed) = Entry::decode(&buf[pos..])?;
        let descriptor = Descriptor {
            file_id,
            value_size: entry.value.len() as u16,
            entry_offset: pos as u32,
            value_offset: (pos + ENTRY_HEADER_BYTES + entry.key.len()) as u32,
        };
        out.push((entry, descriptor));
        pos += consumed;
    }
    Ok(out)
}

/// Sequentially parses a hint file into its records.
pub fn read_hint_file(fs: &dyn FileSystem, path: &Path) -> Result<Vec<HintRecord>> {
    let mut file = fs.open_ro(path).map_err(DataFileError::io("open hint file"))?;
    let size = file.len().map_err(DataFileError::io("stat hint file"))?;

    let mut buf = vec![0u8; size as usize];
    file.read_at(0, &mut buf)
        .map_err(DataFileError::io("read hint file"))?;

    let mut out = Vec::with_capacity(estimate_entries(size));
    let mut pos = 0usize;
    while pos < buf.len() {
        let (record, consumed) = HintRecord::decode(&buf[pos..])?;
        out.push(record);
        pos += consumed;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::paths::{data_path, hint_path};

    #[test]
    fn scan_rebuilds_descriptors_from_offsets() {
        let fs = MemFs::new();
        let path = data_path(Path::new("/db"), 2);
        let mut f = fs.open_rw(&path).unwrap();

        let entries = vec![
            Entry::new(b"alpha".to_vec(), b"1".to_vec()),
            Entry::tombstone(b"beta".to_vec()),
            Entry::new(b"alpha".to_vec(), b"two".to_vec()),
        ];
        for e in &entries {
            f.append(&e.encode()).unwrap();
        }

        let scanned = read_data_file(&fs, &path, 2).unwrap();
        assert_eq!(scanned.len(), 3);

        let mut expect_offset = 0u32;
        for ((entry, desc), original) in scanned.iter().zip(&entries) {
            assert_eq!(entry, original);
            assert_eq!(desc.file_id, 2);
            assert_eq!(desc.entry_offset, expect_offset);
            assert_eq!(
                desc.value_offset,
                expect_offset + ENTRY_HEADER_BYTES as u32 + entry.key.len() as u32
            );
            assert_eq!(desc.value_size as usize, entry.value.len());
            expect_offset += entry.encoded_len() as u32;
        }
    }

    #[test]
    fn corrupt_entry_fails_the_scan() {
        let fs = MemFs::new();
        let path = data_path(Path::new("/db"), 0);
        let mut f = fs.open_rw(&path).unwrap();

        let mut bytes = Entry::new(b"k".to_vec(), b"v".to_vec()).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        f.append(&bytes).unwrap();

        let err = read_data_file(&fs, &path, 0).unwrap_err();
        assert!(matches!(err, DataFileError::EntryCorrupted));
    }

    #[test]
    fn truncated_tail_fails_the_scan() {
        let fs = MemFs::new();
        let path = data_path(Path::new("/db"), 0);
        let mut f = fs.open_rw(&path).unwrap();

        let bytes = Entry::new(b"key".to_vec(), b"value".to_vec()).encode();
        f.append(&bytes[..bytes.len() - 3]).unwrap();

        assert!(read_data_file(&fs, &path, 0).is_err());
    }

    #[test]
    fn hint_file_round_trip() {
        let fs = MemFs::new();
        let path = hint_path(Path::new("/db"), 1);
        let mut f = fs.open_rw(&path).unwrap();

        let records = vec![
            HintRecord {
                descriptor: Descriptor {
                    file_id: 1,
                    value_size: 3,
                    entry_offset: 0,
                    value_offset: 13,
                },
                key: b"a".to_vec(),
            },
            HintRecord {
                descriptor: Descriptor {
                    file_id: 1,
                    value_size: 5,
                    entry_offset: 16,
                    value_offset: 30,
                },
                key: b"bb".to_vec(),
            },
        ];
        for r in &records {
            f.append(&r.encode()).unwrap();
        }

        assert_eq!(read_hint_file(&fs, &path).unwrap(), records);
    }

    #[test]
    fn empty_file_scans_to_nothing() {
        let fs = MemFs::new();
        let path = data_path(Path::new("/db"), 0);
        fs.open_rw(&path).unwrap();

        assert!(read_data_file(&fs, &path, 0).unwrap().is_empty());
    }
}
