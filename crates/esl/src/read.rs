//! Read path: `get()` and `get_entry()`.
//!
//! A lookup resolves the key through the directory, then reads from the file
//! the descriptor points at. Active-file reads go through the write latch so
//! they can never observe a half-appended entry; inactive files are opened
//! read-only per read.

use datafile::{data_path, Entry};
use keydir::Descriptor;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::{Error, Result, Shared, Store};

/// Nap length while a merge holds the compaction flag.
const COMPACT_SPIN: Duration = Duration::from_millis(1);

impl Store {
    /// Returns the current value of `key` (the quick path: value bytes only,
    /// no checksum work).
    ///
    /// # Errors
    ///
    /// [`Error::KeyNotFound`] when the key is absent or tombstoned.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.lookup(key, |shared, desc| {
            let mut value = vec![0u8; desc.value_size as usize];
            shared.read_range(desc.file_id, desc.value_offset, &mut value)?;
            Ok(value)
        })
    }

    /// Returns the entire record for `key`, CRC-validated.
    ///
    /// # Errors
    ///
    /// [`Error::KeyNotFound`] as for [`get`](Store::get); a checksum mismatch
    /// fails with `EntryCorrupted` and affects only this read.
    pub fn get_entry(&self, key: &[u8]) -> Result<Entry> {
        self.lookup(key, |shared, desc| {
            let len = (desc.value_offset - desc.entry_offset) + desc.value_size as u32;
            let mut buf = vec![0u8; len as usize];
            shared.read_range(desc.file_id, desc.entry_offset, &mut buf)?;
            let (entry, _) = Entry::decode(&buf).map_err(Error::Data)?;
            Ok(entry)
        })
    }

    /// Resolves `key` to a live descriptor and runs `read` against it.
    ///
    /// A merge reuses the ids of the files it replaces, so a descriptor
    /// resolved before the swap can address fresh compacted bytes at the old
    /// offsets. The descriptor is therefore only trusted when no merge
    /// overlapped the lookup-and-read window: resolution waits out any merge
    /// in progress, and the whole lookup reruns (through the refreshed
    /// directory) whenever the merge epoch moved underneath it.
    fn lookup<T>(&self, key: &[u8], read: impl Fn(&Shared, &Descriptor) -> Result<T>) -> Result<T> {
        let shared = &*self.shared;
        loop {
            shared.wait_for_merge();
            let epoch = shared.merge_epoch.load(Ordering::Acquire);

            let slot = shared.keydir.get(key).ok_or(Error::KeyNotFound)?;
            let desc = slot.descriptor().ok_or(Error::KeyNotFound)?;

            let result = read(shared, &desc);

            if shared.compacting.load(Ordering::Acquire)
                || shared.merge_epoch.load(Ordering::Acquire) != epoch
            {
                continue;
            }
            return result;
        }
    }
}

impl Shared {
    /// Naps until no merge holds the compaction flag.
    fn wait_for_merge(&self) {
        while self.compacting.load(Ordering::Acquire) {
            std::thread::sleep(COMPACT_SPIN);
        }
    }

    /// Reads `buf.len()` bytes at `offset` within data file `file_id`,
    /// whichever file that currently is.
    pub(crate) fn read_range(&self, file_id: u16, offset: u32, buf: &mut [u8]) -> Result<()> {
        // decide active vs. inactive under the latch: the active id can only
        // move while we hold it
        {
            let mut active = self.active.lock();
            if active.id() == file_id {
                active.read_at(offset, buf)?;
                return Ok(());
            }
        }

        let path = data_path(&self.path, file_id);
        let mut file = self
            .opts
            .fs
            .open_ro(&path)
            .map_err(|source| Error::Io {
                op: "open inactive data file",
                source,
            })?;
        file.read_at(offset as u64, buf).map_err(|source| Error::Io {
            op: "read inactive data file",
            source,
        })
    }
}
