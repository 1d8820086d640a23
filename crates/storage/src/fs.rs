use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;

use crate::{ObjectHandle, ObjectReader, ObjectStore, ObjectWriter, Result, StorageError};

/// Prefix of in-flight upload files. Names starting with it are hidden from
/// [`ObjectStore::list`].
const PART_PREFIX: &str = ".";
const PART_SUFFIX: &str = ".part";

/// Filesystem-backed object store.
///
/// Each container is a directory directly under `root`; each object is a
/// regular file in it. Writers stream into a hidden `.<name>.part` file that
/// is fsynced and renamed over the target on finish, the same temp + rename
/// pattern used for any file that must never be observed half-written.
///
/// [`ObjectStore::delete_if_generation`] uses the check-then-delete default;
/// a filesystem has no conditional unlink.
///
/// Generations are file modification times in nanoseconds. Every publish
/// stamps the file explicitly with a time strictly after the last stamp this
/// store issued, so two replacements never share a generation even when the
/// kernel clock is coarse.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    clock: Arc<GenerationClock>,
}

/// Issues strictly increasing nanosecond stamps.
#[derive(Debug, Default)]
struct GenerationClock {
    last: AtomicU64,
}

impl GenerationClock {
    fn next(&self) -> u64 {
        let now = nanos_since_epoch(SystemTime::now());
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Sets the modification time of `file` to a fresh stamp and returns it.
    fn stamp(&self, file: &File) -> io::Result<u64> {
        let generation = self.next();
        file.set_modified(UNIX_EPOCH + Duration::from_nanos(generation))?;
        Ok(generation)
    }
}

fn nanos_since_epoch(t: SystemTime) -> u64 {
    let nanos = t.duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

impl FsStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            clock: Arc::new(GenerationClock::default()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf> {
        check_name(container)?;
        Ok(self.root.join(container))
    }

    fn object_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.container_dir(container)?.join(name))
    }

    fn generation_of(path: &Path) -> io::Result<u64> {
        Ok(nanos_since_epoch(fs::metadata(path)?.modified()?))
    }
}

/// Rejects names that would escape the container directory or collide with
/// in-flight upload files.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with(PART_PREFIX)
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(StorageError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid object or container name: {:?}", name),
        )));
    }
    Ok(())
}

fn map_not_found(e: io::Error, container: &str, name: &str) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::not_found(container, name)
    } else {
        StorageError::Io(e)
    }
}

/// Best-effort fsync of a directory so a rename inside it is durable.
fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

impl ObjectStore for FsStore {
    fn exists(&self, container: &str, name: &str) -> Result<bool> {
        Ok(self.object_path(container, name)?.is_file())
    }

    fn generation(&self, container: &str, name: &str) -> Result<Option<u64>> {
        let path = self.object_path(container, name)?;
        match Self::generation_of(&path) {
            Ok(g) => Ok(Some(g)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open_reader(&self, container: &str, name: &str) -> Result<ObjectReader> {
        let path = self.object_path(container, name)?;
        let file = File::open(&path).map_err(|e| map_not_found(e, container, name))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_writer(&self, container: &str, name: &str) -> Result<Box<dyn ObjectWriter>> {
        let dir = self.container_dir(container)?;
        let target = self.object_path(container, name)?;
        fs::create_dir_all(&dir)?;

        let part = dir.join(format!("{}{}{}", PART_PREFIX, name, PART_SUFFIX));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part)?;

        debug!("opened writer {} (staging at {})", target.display(), part.display());
        Ok(Box::new(FsObjectWriter {
            file: Some(BufWriter::new(file)),
            part,
            target,
            clock: Arc::clone(&self.clock),
        }))
    }

    fn delete(&self, container: &str, name: &str) -> Result<()> {
        let path = self.object_path(container, name)?;
        fs::remove_file(&path).map_err(|e| map_not_found(e, container, name))?;
        if let Some(parent) = path.parent() {
            sync_dir(parent);
        }
        Ok(())
    }

    fn rename(&self, container: &str, old: &str, new: &str) -> Result<ObjectHandle> {
        let from = self.object_path(container, old)?;
        let to = self.object_path(container, new)?;
        fs::rename(&from, &to).map_err(|e| map_not_found(e, container, old))?;
        if let Some(parent) = to.parent() {
            sync_dir(parent);
        }
        let generation = self.clock.stamp(&OpenOptions::new().write(true).open(&to)?)?;
        Ok(ObjectHandle {
            container: container.to_string(),
            name: new.to_string(),
            generation,
        })
    }

    /// Links `old` under `new` and then unlinks `old`. Creating the link
    /// fails if `new` exists, so the destination check and the move cannot
    /// be split by another writer. The `old_generation` check still runs
    /// before the link.
    fn rename_if_absent(
        &self,
        container: &str,
        old: &str,
        old_generation: u64,
        new: &str,
    ) -> Result<ObjectHandle> {
        let found = self.generation(container, old)?;
        if found != Some(old_generation) {
            return Err(StorageError::precondition(container, old, Some(old_generation), found));
        }
        let from = self.object_path(container, old)?;
        let to = self.object_path(container, new)?;
        if let Err(e) = fs::hard_link(&from, &to) {
            if e.kind() == io::ErrorKind::AlreadyExists {
                let taken = self.generation(container, new)?;
                return Err(StorageError::precondition(container, new, None, taken));
            }
            return Err(map_not_found(e, container, old));
        }
        fs::remove_file(&from)?;
        if let Some(parent) = to.parent() {
            sync_dir(parent);
        }
        let generation = self.clock.stamp(&OpenOptions::new().write(true).open(&to)?)?;
        debug!("moved {}/{} -> {} (generation {})", container, old, new, generation);
        Ok(ObjectHandle {
            container: container.to_string(),
            name: new.to_string(),
            generation,
        })
    }

    fn list(&self, container: &str) -> Result<Vec<String>> {
        let dir = self.container_dir(container)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(PART_PREFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Writer over a hidden part file, renamed over the target on finish.
struct FsObjectWriter {
    /// `None` once finished.
    file: Option<BufWriter<File>>,
    part: PathBuf,
    target: PathBuf,
    clock: Arc<GenerationClock>,
}

impl FsObjectWriter {
    fn file(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "writer already finished"))
    }
}

impl Write for FsObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl ObjectWriter for FsObjectWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        let mut file = self.file.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "writer already finished")
        })?;
        file.flush()?;
        let file = file.into_inner().map_err(|e| e.into_error())?;
        self.clock.stamp(&file)?;
        file.sync_all()?;

        fs::rename(&self.part, &self.target)?;
        if let Some(parent) = self.target.parent() {
            sync_dir(parent);
        }
        debug!("published {}", self.target.display());
        Ok(())
    }
}

/// An unfinished writer removes its part file so an aborted upload leaves no
/// trace.
impl Drop for FsObjectWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.part);
        }
    }
}
