//! The merge engine and its background driver.
//!
//! A single long-lived thread owns the one-slot command channel. Its receive
//! timeout doubles as the ticker: on every tick it counts the immutable data
//! files and queues a merge when they pile past the threshold; an explicit
//! [`Store::merge`](crate::Store::merge) enqueues the same command.
//!
//! A merge walks the immutable files newest to oldest, keeps the newest
//! occurrence of every key, drops deleted keys entirely, renames the inputs
//! to `.bak`, rewrites the survivors into fresh data + hint pairs below the
//! active id, refreshes the key directory, and only then removes the
//! backups. Any failure restores the originals, so committed data is never the
//! casualty of a failed merge.

use datafile::{
    data_path, file_id_from_path, hint_path, read_data_file, Backup, Entry, MergeWriter,
    PathSnapshot,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::{Result, Shared};

pub(crate) enum Command {
    Merge,
    Shutdown,
}

/// The compactor loop. Exits on a shutdown command or when every sender is
/// gone.
pub(crate) fn run(shared: Arc<Shared>, commands: Receiver<Command>) {
    loop {
        match commands.recv_timeout(shared.opts.compact_interval) {
            Ok(Command::Merge) => {}
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {
                if !needs_merge(&shared) {
                    continue;
                }
            }
        }

        if let Err(err) = merge(&shared) {
            // merge failures leave the originals restored; the store keeps
            // serving and the next tick tries again
            error!(error = %err, "background merge failed");
        }
    }
}

/// Ticker admission check: are there more immutable data files than the
/// configured threshold?
fn needs_merge(shared: &Shared) -> bool {
    match PathSnapshot::take(shared.opts.fs.as_ref(), &shared.path) {
        Ok(snapshot) => {
            let immutable = snapshot.data_files.len().saturating_sub(1);
            immutable >= shared.opts.compact_threshold as usize
        }
        Err(err) => {
            warn!(error = %err, "could not snapshot store directory");
            false
        }
    }
}

/// Runs one merge. Single-winner: a concurrent merge in progress turns this
/// call into a no-op success.
pub(crate) fn merge(shared: &Shared) -> Result<()> {
    if shared
        .compacting
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(());
    }

    let result = merge_files(shared);
    // advance the epoch before releasing the flag: a reader that saw the
    // flag clear must also see the new count, or it could trust a
    // descriptor resolved before the swap
    shared.merge_epoch.fetch_add(1, Ordering::Release);
    shared.compacting.store(false, Ordering::Release);
    result
}

fn merge_files(shared: &Shared) -> Result<()> {
    let fs = shared.opts.fs.as_ref();
    let snapshot = PathSnapshot::take(fs, &shared.path)?;
    let active_id = shared.active.lock().id();

    // every immutable data file, newest first; the active file never merges
    let mut file_ids: Vec<u16> = snapshot
        .data_files
        .iter()
        .filter_map(|path| file_id_from_path(path).ok())
        .filter(|id| *id != active_id)
        .collect();
    file_ids.sort_unstable_by(|a, b| b.cmp(a));
    if file_ids.is_empty() {
        return Ok(());
    }

    let hinted: HashSet<u16> = snapshot
        .hint_files
        .iter()
        .filter_map(|path| file_id_from_path(path).ok())
        .collect();

    // Scanning: first occurrence wins, so walking newest to oldest (and each
    // file's entries newest first) keeps exactly the latest version of every
    // key. A tombstone claims its key into the tombstone set and suppresses
    // every older value; the key is omitted from the output entirely.
    let mut tombstone: HashSet<Vec<u8>> = HashSet::with_capacity(1024);
    let mut alive: HashMap<Vec<u8>, Entry> = HashMap::with_capacity(1024);

    for &file_id in &file_ids {
        let entries = read_data_file(fs, &data_path(&shared.path, file_id), file_id)?;
        for (entry, _) in entries.into_iter().rev() {
            if tombstone.contains(&entry.key) || alive.contains_key(&entry.key) {
                continue;
            }
            if entry.is_tombstone() {
                tombstone.insert(entry.key);
            } else {
                alive.insert(entry.key.clone(), entry);
            }
        }
    }

    debug!(
        files = file_ids.len(),
        alive = alive.len(),
        dropped = tombstone.len(),
        "merge starting"
    );

    // Move every input (and its hint sibling, if any) aside. Output ids reuse
    // the input ids, so the originals must be out of the way first, and the
    // backups are what a failure restores.
    let mut backups: Vec<Backup> = Vec::with_capacity(file_ids.len() * 2);
    for &file_id in &file_ids {
        let paths = if hinted.contains(&file_id) {
            vec![
                data_path(&shared.path, file_id),
                hint_path(&shared.path, file_id),
            ]
        } else {
            vec![data_path(&shared.path, file_id)]
        };
        for path in paths {
            match Backup::create(fs, &path) {
                Ok(backup) => backups.push(backup),
                Err(err) => {
                    restore_backups(shared, &backups);
                    return Err(err.into());
                }
            }
        }
    }

    // Writing: rewrite the alive set into fresh pairs below the active id.
    let merged_ids: HashSet<u16> = file_ids.iter().copied().collect();
    let mut produced: Vec<u16> = Vec::new();
    let outcome = if alive.is_empty() {
        Ok(HashMap::new())
    } else {
        match MergeWriter::create(fs, &shared.path, active_id - 1, shared.opts.max_file_bytes) {
            Err(err) => Err(err),
            Ok(mut writer) => {
                let mut failed = None;
                for entry in alive.values() {
                    if let Err(err) = writer.append(entry) {
                        failed = Some(err);
                        break;
                    }
                }
                produced = writer.files_written().to_vec();
                match failed {
                    Some(err) => Err(err),
                    None => writer.finish().map(|output| output.moved),
                }
            }
        }
    };

    let moved = match outcome {
        Ok(moved) => moved,
        Err(err) => {
            // drop the partial outputs first: restoring a backup renames over
            // any output that reused its id
            for &file_id in &produced {
                let _ = fs.remove(&data_path(&shared.path, file_id));
                let _ = fs.remove(&hint_path(&shared.path, file_id));
            }
            restore_backups(shared, &backups);
            return Err(err.into());
        }
    };

    // Swapping: refresh the directory before the backups disappear, under the
    // same latch the write path uses.
    {
        let _active = shared.active.lock();
        shared.keydir.rewrite(&merged_ids, &moved);
    }

    for backup in &backups {
        if let Err(err) = backup.clean(fs) {
            warn!(error = %err, "could not remove merge backup");
        }
    }

    debug!(produced = ?produced, "merge finished");
    Ok(())
}

fn restore_backups(shared: &Shared, backups: &[Backup]) {
    let fs = shared.opts.fs.as_ref();
    for backup in backups {
        if let Err(err) = backup.restore(fs) {
            warn!(error = %err, "could not restore merge backup");
        }
    }
}
