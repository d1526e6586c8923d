use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An open file as the store sees it: positioned reads, appending writes,
/// durability, size.
pub trait FsFile: Send {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Appends `data` at the end of the file, returning the byte count written.
    fn append(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Flushes file content durably to the backing medium.
    fn sync(&mut self) -> io::Result<()>;

    /// Current file size in bytes.
    fn len(&mut self) -> io::Result<u64>;
}

/// The file-system capability set the store consumes. Implementations other
/// than the native one (an in-memory one, say) are equally acceptable.
pub trait FileSystem: Send + Sync {
    /// Opens `path` for reading and appending, creating it when missing.
    fn open_rw(&self, path: &Path) -> io::Result<Box<dyn FsFile>>;

    /// Opens an existing `path` read-only.
    fn open_ro(&self, path: &Path) -> io::Result<Box<dyn FsFile>>;

    /// Size of the file at `path`.
    fn size(&self, path: &Path) -> io::Result<u64>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// All files directly under `dir` whose name ends with `suffix`, sorted.
    fn glob(&self, dir: &Path, suffix: &str) -> io::Result<Vec<PathBuf>>;

    /// Creates `path` and any missing ancestors.
    fn mkdir_all(&self, path: &Path) -> io::Result<()>;

    fn dir_exists(&self, path: &Path) -> bool;
}

/// The native file system. Store directories are created `0744` and data
/// files `0644` on Unix.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

struct OsFile(File);

impl FsFile for OsFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.0.seek(SeekFrom::Start(offset))?;
        self.0.read_exact(buf)
    }

    fn append(&mut self, data: &[u8]) -> io::Result<usize> {
        // opened with O_APPEND, so writes land at the end regardless of any
        // seek a read_at left behind
        self.0.write_all(data)?;
        Ok(data.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.0.sync_all()
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.0.metadata()?.len())
    }
}

impl FileSystem for OsFs {
    fn open_rw(&self, path: &Path) -> io::Result<Box<dyn FsFile>> {
        let mut opts = OpenOptions::new();
        opts.create(true).read(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o644);
        }
        Ok(Box::new(OsFile(opts.open(path)?)))
    }

    fn open_ro(&self, path: &Path) -> io::Result<Box<dyn FsFile>> {
        Ok(Box::new(OsFile(File::open(path)?)))
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn glob(&self, dir: &Path, suffix: &str) -> io::Result<Vec<PathBuf>> {
        let mut matched = Vec::new();
        for dirent in std::fs::read_dir(dir)? {
            let path = dirent?.path();
            let is_match = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(suffix))
                .unwrap_or(false);
            if is_match && path.is_file() {
                matched.push(path);
            }
        }
        matched.sort();
        Ok(matched)
    }

    fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o744);
        }
        builder.create(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// A fully in-memory file system. Used by hermetic tests; behaves like the
/// native one for the capability set above.
#[derive(Debug, Default)]
pub struct MemFs {
    inner: Mutex<MemFsInner>,
}

#[derive(Debug, Default)]
struct MemFsInner {
    files: HashMap<PathBuf, Arc<Mutex<Vec<u8>>>>,
    dirs: HashSet<PathBuf>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    writable: bool,
}

impl FsFile for MemFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of file",
            ));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file opened read-only",
            ));
        }
        self.data.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.data.lock().len() as u64)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display()))
}

impl FileSystem for MemFs {
    fn open_rw(&self, path: &Path) -> io::Result<Box<dyn FsFile>> {
        let mut inner = self.inner.lock();
        let data = inner
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();
        Ok(Box::new(MemFile {
            data,
            writable: true,
        }))
    }

    fn open_ro(&self, path: &Path) -> io::Result<Box<dyn FsFile>> {
        let inner = self.inner.lock();
        let data = inner.files.get(path).cloned().ok_or_else(|| not_found(path))?;
        Ok(Box::new(MemFile {
            data,
            writable: false,
        }))
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        let inner = self.inner.lock();
        let data = inner.files.get(path).ok_or_else(|| not_found(path))?;
        let len = data.lock().len() as u64;
        Ok(len)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        let data = inner.files.remove(from).ok_or_else(|| not_found(from))?;
        inner.files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.files.remove(path).ok_or_else(|| not_found(path))?;
        Ok(())
    }

    fn glob(&self, dir: &Path, suffix: &str) -> io::Result<Vec<PathBuf>> {
        let inner = self.inner.lock();
        let mut matched: Vec<PathBuf> = inner
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(suffix))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        matched.sort();
        Ok(matched)
    }

    fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        let mut cur = Some(path);
        while let Some(p) = cur {
            inner.dirs.insert(p.to_path_buf());
            cur = p.parent();
        }
        Ok(())
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.inner.lock().dirs.contains(path)
    }
}
