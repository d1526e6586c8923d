use keydir::Descriptor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::entry::{Entry, ENTRY_HEADER_BYTES};
use crate::fs::{FileSystem, FsFile};
use crate::hint::HintRecord;
use crate::paths::{data_path, hint_path};
use crate::{DataFileError, Result};

/// The single data file currently accepting appends.
///
/// Tracks the write offset so every append can hand back the entry offset it
/// landed at. Opening an existing file resumes at its current size.
pub struct ActiveFile {
    id: u16,
    file: Box<dyn FsFile>,
    offset: u32,
}

impl ActiveFile {
    /// Opens (or creates) the data file with `id` under `dir` and adopts its
    /// current length as the write offset.
    pub fn open(fs: &dyn FileSystem, dir: &Path, id: u16) -> Result<Self> {
        let path = data_path(dir, id);
        let mut file = fs.open_rw(&path).map_err(DataFileError::io("open data file"))?;
        let offset = file.len().map_err(DataFileError::io("stat data file"))? as u32;
        Ok(Self { id, file, offset })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Appends raw entry bytes, returning the entry offset they start at.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u32> {
        let n = self
            .file
            .append(bytes)
            .map_err(DataFileError::io("append data file"))?;
        let entry_offset = self.offset;
        self.offset += n as u32;
        Ok(entry_offset)
    }

    /// Exact read at `offset` within this file.
    pub fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_at(offset as u64, buf)
            .map_err(DataFileError::io("read data file"))
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync().map_err(DataFileError::io("sync data file"))
    }
}

/// Result of a finished merge write: which file ids were produced and the new
/// descriptor of every rewritten key.
#[derive(Debug)]
pub struct MergeOutput {
    pub files_written: Vec<u16>,
    pub moved: HashMap<Vec<u8>, Descriptor>,
}

/// Writes the alive set of a merge into paired data + hint files.
///
/// Output ids descend from the starting id, switching to the next lower id
/// whenever the current data file reaches `max_file_bytes`. Every appended
/// entry gets a matching hint record in the sibling hint file.
pub struct MergeWriter<'a> {
    fs: &'a dyn FileSystem,
    dir: PathBuf,
    max_file_bytes: u32,
    current_id: u16,
    data: Box<dyn FsFile>,
    hint: Box<dyn FsFile>,
    offset: u32,
    files_written: Vec<u16>,
    moved: HashMap<Vec<u8>, Descriptor>,
    buf: Vec<u8>,
}

impl<'a> MergeWriter<'a> {
    /// Opens the first output pair at `start_id` (callers pass the id just
    /// below the active file's).
    pub fn create(
        fs: &'a dyn FileSystem,
        dir: &Path,
        start_id: u16,
        max_file_bytes: u32,
    ) -> Result<Self> {
        let (data, hint) = open_pair(fs, dir, start_id)?;
        Ok(Self {
            fs,
            dir: dir.to_path_buf(),
            max_file_bytes,
            current_id: start_id,
            data,
            hint,
            offset: 0,
            files_written: vec![start_id],
            moved: HashMap::new(),
            buf: Vec::with_capacity(256),
        })
    }

    /// Every output file id produced so far, newest id first. On failure the
    /// caller removes these (and their hint siblings).
    pub fn files_written(&self) -> &[u16] {
        &self.files_written
    }

    /// Appends one alive entry and its hint record, recording the key's new
    /// descriptor.
    pub fn append(&mut self, entry: &Entry) -> Result<()> {
        // split before writing, never after: the final entry must not open an
        // empty trailing pair, and id 0 has nowhere lower to go
        if self.offset >= self.max_file_bytes && self.current_id > 0 {
            self.rotate()?;
        }

        self.buf.clear();
        entry.encode_into(&mut self.buf);
        let n = self
            .data
            .append(&self.buf)
            .map_err(DataFileError::io("append merge data file"))?;

        let descriptor = Descriptor {
            file_id: self.current_id,
            value_size: entry.value.len() as u16,
            entry_offset: self.offset,
            value_offset: self.offset + (ENTRY_HEADER_BYTES + entry.key.len()) as u32,
        };

        self.buf.clear();
        let record = HintRecord {
            descriptor,
            key: entry.key.clone(),
        };
        record.encode_into(&mut self.buf);
        self.hint
            .append(&self.buf)
            .map_err(DataFileError::io("append merge hint file"))?;

        self.moved.insert(record.key, descriptor);
        self.offset += n as u32;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.data
            .sync()
            .map_err(DataFileError::io("sync merge data file"))?;
        self.hint
            .sync()
            .map_err(DataFileError::io("sync merge hint file"))?;

        self.current_id -= 1;
        let (data, hint) = open_pair(self.fs, &self.dir, self.current_id)?;
        self.data = data;
        self.hint = hint;
        self.offset = 0;
        self.files_written.push(self.current_id);
        Ok(())
    }

    /// Syncs the final pair and hands back the produced ids and descriptors.
    pub fn finish(mut self) -> Result<MergeOutput> {
        self.data
            .sync()
            .map_err(DataFileError::io("sync merge data file"))?;
        self.hint
            .sync()
            .map_err(DataFileError::io("sync merge hint file"))?;
        Ok(MergeOutput {
            files_written: self.files_written,
            moved: self.moved,
        })
    }
}

fn open_pair(
    fs: &dyn FileSystem,
    dir: &Path,
    id: u16,
) -> Result<(Box<dyn FsFile>, Box<dyn FsFile>)> {
    let data = fs
        .open_rw(&data_path(dir, id))
        .map_err(DataFileError::io("open merge data file"))?;
    let hint = fs
        .open_rw(&hint_path(dir, id))
        .map_err(DataFileError::io("open merge hint file"))?;
    Ok((data, hint))
}
