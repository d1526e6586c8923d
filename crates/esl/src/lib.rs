//! # ESL — an embedded append-only key/value store
//!
//! A Bitcask-model store: every write appends an immutable record to the
//! current data file, an in-memory key directory maps each live key to the
//! byte range of its newest value, and a background merge rewrites the
//! immutable files to reclaim space from superseded and deleted entries.
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                    STORE                      │
//! │                                               │
//! │ write.rs → encode entry → append to active    │
//! │              |            file (latched)      │
//! │              v                                │
//! │          keydir slot update                   │
//! │              |                                │
//! │              |  (offset >= max_file_bytes?)   │
//! │              v            yes                 │
//! │          archive() → next active file id      │
//! │                                               │
//! │ read.rs → keydir lookup → read_at(value)      │
//! │            (active: under the write latch)    │
//! │                                               │
//! │ compaction.rs → ticker / Merge() command      │
//! │            → rewrite immutable files,         │
//! │              emit hint siblings, swap         │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Directory layout
//!
//! All files live flat in one directory: `NNNNNNNNNN.esld` data files
//! (ascending ids, the largest is the writable one), `NNNNNNNNNN.hint`
//! sidecars produced by compaction, and transient `.bak` names while a merge
//! swaps files.
//!
//! ## Example
//!
//! ```rust,no_run
//! use esl::{Options, Store};
//!
//! let store = Store::open("./data", Options::default()).unwrap();
//! store.put(b"key", b"value").unwrap();
//! assert_eq!(store.get(b"key").unwrap(), b"value");
//! store.delete(b"key").unwrap();
//! store.close().unwrap();
//! ```

mod compaction;
mod error;
mod options;
mod read;
mod recovery;
mod write;

pub use datafile::{DataFileError, Entry, FileSystem, MemFs, OsFs};
pub use error::{Error, Result};
pub use keydir::{Descriptor, KeyDir, Slot};
pub use options::Options;

use datafile::{ActiveFile, PathSnapshot};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

use compaction::Command;

/// The store handle. Every operation takes `&self` and the handle is
/// `Send + Sync`, so threads share one instance (behind an `Arc` if needed).
///
/// Opening performs full recovery (hint files when present, otherwise a
/// CRC-validated scan of the data files) and starts the background compactor.
/// Dropping the handle shuts the compactor down and syncs the active file;
/// [`Store::close`] does the same with the errors surfaced.
pub struct Store {
    shared: Arc<Shared>,
    commands: Option<SyncSender<Command>>,
    compactor: Option<JoinHandle<()>>,
}

/// State shared between the embedder-facing handle and the compactor thread.
pub(crate) struct Shared {
    pub(crate) path: PathBuf,
    pub(crate) opts: Options,
    pub(crate) keydir: KeyDir,
    /// The exclusive write latch: guards the active file handle, its id, and
    /// the write offset. Readers targeting the active file take it too.
    pub(crate) active: Mutex<ActiveFile>,
    /// Single-winner flag for rotation; writers nap briefly while set.
    pub(crate) archiving: AtomicBool,
    /// Single-winner flag for compaction; readers nap briefly while set so
    /// they never resolve a descriptor mid-swap.
    pub(crate) compacting: AtomicBool,
    /// Bumped after every merge that ran. A reader whose lookup-and-read
    /// window saw the count move re-resolves through the refreshed
    /// directory, because the merge reuses the ids of the files it replaced.
    pub(crate) merge_epoch: AtomicU64,
}

impl Store {
    /// Opens (or creates) a store in the directory at `path`.
    ///
    /// Recovery prefers hint files; data files without one are scanned
    /// sequentially with every entry CRC-checked. The active file is the
    /// highest-id data file found (created at id 0 for an empty directory)
    /// and appending resumes at its current size.
    ///
    /// # Errors
    ///
    /// I/O failures surface as [`Error::OpenFailed`]; a corrupted entry found
    /// during recovery aborts the open with the corruption error itself.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        let fs = options.fs.clone();

        if !fs.dir_exists(&path) {
            fs.mkdir_all(&path)
                .map_err(|source| Error::OpenFailed {
                    source: DataFileError::Io {
                        op: "create store directory",
                        source,
                    },
                })?;
        }

        let snapshot = PathSnapshot::take(fs.as_ref(), &path).map_err(Error::open)?;

        let keydir = KeyDir::new();
        if !snapshot.is_empty() {
            recovery::restore_keydir(fs.as_ref(), &snapshot, &keydir).map_err(Error::open)?;
        }

        let active =
            ActiveFile::open(fs.as_ref(), &path, snapshot.last_data_id).map_err(Error::open)?;
        debug!(
            path = %path.display(),
            active_file_id = active.id(),
            keys = keydir.len(),
            "store opened"
        );

        let shared = Arc::new(Shared {
            path,
            opts: options,
            keydir,
            active: Mutex::new(active),
            archiving: AtomicBool::new(false),
            compacting: AtomicBool::new(false),
            merge_epoch: AtomicU64::new(0),
        });

        let (tx, rx) = sync_channel(1);
        let worker = Arc::clone(&shared);
        let compactor = std::thread::Builder::new()
            .name("esl-compactor".into())
            .spawn(move || compaction::run(worker, rx))
            .map_err(|source| Error::Io {
                op: "spawn compactor",
                source,
            })?;

        Ok(Store {
            shared,
            commands: Some(tx),
            compactor: Some(compactor),
        })
    }

    /// Requests a compaction of the immutable data files. Non-blocking: the
    /// request is dropped when one is already queued or running.
    pub fn merge(&self) {
        if let Some(tx) = &self.commands {
            let _ = tx.try_send(Command::Merge);
        }
    }

    /// Runs a merge on the caller's thread and reports its outcome. The
    /// background compactor stays out of the way (only one merge ever runs
    /// at a time).
    pub fn merge_now(&self) -> Result<()> {
        compaction::merge(&self.shared)
    }

    /// All live keys, in no particular order. Tombstoned keys are skipped.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        self.shared.keydir.live_keys()
    }

    /// Id of the data file currently accepting writes.
    pub fn active_file_id(&self) -> u16 {
        self.shared.active.lock().id()
    }

    /// Directory this store lives in.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Stops the compactor, syncs the active file, and releases the store.
    ///
    /// Expected to be called with no other operations in flight.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(handle) = self.compactor.take() {
            if let Some(tx) = &self.commands {
                // a queued merge may occupy the slot; dropping the sender
                // below ends the loop regardless
                let _ = tx.try_send(Command::Shutdown);
            }
            drop(self.commands.take());
            let _ = handle.join();
        }
        self.shared.active.lock().sync()?;
        debug!(path = %self.shared.path.display(), "store closed");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.shared.active.lock();
        f.debug_struct("Store")
            .field("path", &self.shared.path)
            .field("active_file_id", &active.id())
            .field("active_offset", &active.offset())
            .field("keydir_len", &self.shared.keydir.len())
            .finish()
    }
}

/// Best-effort shutdown when the handle is dropped without `close()`.
impl Drop for Store {
    fn drop(&mut self) {
        if self.compactor.is_some() {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests;
