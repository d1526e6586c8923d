//! Cold-start recovery: rebuilding the key directory from disk.
//!
//! Hint files are the fast path: each one enumerates the live descriptors
//! of its sibling data file. Data files without a hint are scanned
//! sequentially with every entry CRC-checked; corruption anywhere aborts the
//! open rather than silently dropping data.

use datafile::{file_id_from_path, read_data_file, read_hint_file, FileSystem, PathSnapshot};
use keydir::{KeyDir, Slot};
use std::collections::HashSet;
use tracing::warn;

use datafile::Result;

/// Rebuilds `keydir` from the files in `snapshot`.
///
/// Hint-covered file ids are loaded from their hints and skipped in the data
/// scan. The remaining data files are scanned in ascending id order, so a
/// later write to the same key naturally wins.
pub(crate) fn restore_keydir(
    fs: &dyn FileSystem,
    snapshot: &PathSnapshot,
    keydir: &KeyDir,
) -> Result<()> {
    let mut hinted: HashSet<u16> = HashSet::with_capacity(snapshot.hint_files.len());

    for path in &snapshot.hint_files {
        let file_id = match file_id_from_path(path) {
            Ok(id) => id,
            Err(_) => {
                warn!(path = %path.display(), "skipping unparsable hint file name");
                continue;
            }
        };
        hinted.insert(file_id);

        for record in read_hint_file(fs, path)? {
            keydir.set(&record.key, Slot::Live(record.descriptor));
        }
    }

    // snapshot.data_files is sorted and names are zero-padded, so this walks
    // oldest to newest
    for path in &snapshot.data_files {
        let file_id = match file_id_from_path(path) {
            Ok(id) => id,
            Err(_) => {
                warn!(path = %path.display(), "skipping unparsable data file name");
                continue;
            }
        };
        if hinted.contains(&file_id) {
            continue;
        }

        for (entry, descriptor) in read_data_file(fs, path, file_id)? {
            let slot = if entry.is_tombstone() {
                Slot::Tombstone { file_id }
            } else {
                Slot::Live(descriptor)
            };
            keydir.set(&entry.key, slot);
        }
    }

    Ok(())
}
