//! Write path: `put()`, `delete()`, `sync()`, and active-file rotation.
//!
//! Every mutation encodes an entry, appends it to the active file under the
//! exclusive write latch, and updates the key directory before the latch is
//! released. Rotation happens inside the same critical section, so no reader
//! or writer ever observes a half-transitioned active file.

use datafile::{ActiveFile, Entry, ENTRY_HEADER_BYTES};
use keydir::{Descriptor, Slot};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result, Shared, Store};

/// Nap length while waiting out a rotation in progress.
const ARCHIVE_SPIN: Duration = Duration::from_millis(1);

impl Store {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`Error::KeyOrValueTooLong`] when either side exceeds its configured
    /// limit, [`Error::EmptyValue`] for a zero-length value (the on-disk
    /// tombstone marker), or an I/O failure from the append.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let opts = &self.shared.opts;
        if key.len() > opts.max_key_bytes as usize || value.len() > opts.max_value_bytes as usize {
            return Err(Error::KeyOrValueTooLong);
        }
        if value.is_empty() {
            return Err(Error::EmptyValue);
        }

        self.shared
            .append_entry(Entry::new(key.to_vec(), value.to_vec()))
    }

    /// Removes `key` by appending a tombstone. A no-op (returning `Ok`) when
    /// the key is absent or already deleted.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        match self.shared.keydir.get(key) {
            None => Ok(()),
            Some(slot) if slot.is_tombstone() => Ok(()),
            Some(_) => self.shared.append_entry(Entry::tombstone(key.to_vec())),
        }
    }

    /// Forces the active file durably to disk.
    pub fn sync(&self) -> Result<()> {
        self.shared.active.lock().sync()?;
        Ok(())
    }
}

impl Shared {
    /// Appends `entry` to the active file and points the directory at it.
    /// Rotates the active file when the new offset reaches the size limit.
    pub(crate) fn append_entry(&self, entry: Entry) -> Result<()> {
        // a rotation in flight finishes in bounded time; wait it out before
        // taking the latch
        while self.archiving.load(Ordering::Acquire) {
            std::thread::sleep(ARCHIVE_SPIN);
        }

        let mut active = self.active.lock();
        let bytes = entry.encode();
        let entry_offset = active.append(&bytes)?;

        let slot = if entry.is_tombstone() {
            Slot::Tombstone {
                file_id: active.id(),
            }
        } else {
            Slot::Live(Descriptor {
                file_id: active.id(),
                value_size: entry.value.len() as u16,
                entry_offset,
                value_offset: entry_offset + (ENTRY_HEADER_BYTES + entry.key.len()) as u32,
            })
        };
        self.keydir.set(&entry.key, slot);

        if active.offset() >= self.opts.max_file_bytes {
            self.archive(&mut active)?;
        }
        Ok(())
    }

    /// Rotates to the next active file id. Single-winner: losing the flag
    /// race means another rotation just ran, which is success for us too.
    fn archive(&self, active: &mut ActiveFile) -> Result<()> {
        if self
            .archiving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let result = self.rotate(active);
        self.archiving.store(false, Ordering::Release);
        result
    }

    fn rotate(&self, active: &mut ActiveFile) -> Result<()> {
        active.sync()?;
        let next_id = active.id() + 1;
        *active = ActiveFile::open(self.opts.fs.as_ref(), &self.path, next_id)?;
        debug!(active_file_id = next_id, "rotated active data file");
        Ok(())
    }
}
