//! # Storage - object store gateway
//!
//! The thin storage layer the ingestion engine talks to. Objects live in
//! named containers and are addressed by name. Reads and writes are
//! line-oriented streams so the merged stream never has to be loaded whole.
//!
//! Two backends are provided:
//!
//! | Backend         | Use                                             |
//! |-----------------|-------------------------------------------------|
//! | [`FsStore`]     | one directory per container under a root path   |
//! | [`MemoryStore`] | in-process map with an op log and fault injection |
//!
//! ## Write visibility
//!
//! An object written through [`ObjectStore::open_writer`] only becomes
//! visible when [`ObjectWriter::finish`] returns `Ok`. A writer dropped
//! early leaves the previous object (if any) untouched.
//!
//! ## Generations
//!
//! Every successful write or rename stamps the resulting object with a
//! generation number that differs from the one of the object it replaced.
//! Callers use it to detect that an object changed between a read and a
//! later replace, and pass it back to the conditional operations
//! [`ObjectStore::delete_if_generation`] and
//! [`ObjectStore::rename_if_absent`].

mod fs;
mod memory;

use std::io::{self, BufRead, Read, Write};

use thiserror::Error;

pub use fs::FsStore;
pub use memory::{MemoryStore, StorageOp};

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The addressed object does not exist.
    #[error("object not found: {container}/{name}")]
    NotFound { container: String, name: String },

    /// A failure injected by a test backend.
    #[error("injected failure on {container}/{name}")]
    Injected { container: String, name: String },

    /// A conditional operation found the object at another generation.
    /// `None` means absent.
    #[error("precondition failed on {container}/{name}: expected generation {expected:?}, found {found:?}")]
    PreconditionFailed {
        container: String,
        name: String,
        expected: Option<u64>,
        found: Option<u64>,
    },
}

impl StorageError {
    pub(crate) fn not_found(container: &str, name: &str) -> Self {
        Self::NotFound {
            container: container.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn precondition(container: &str, name: &str, expected: Option<u64>, found: Option<u64>) -> Self {
        Self::PreconditionFailed {
            container: container.to_string(),
            name: name.to_string(),
            expected,
            found,
        }
    }

    /// Returns `true` if this error means the object was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A reference to an object after a rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub container: String,
    pub name: String,
    pub generation: u64,
}

/// Streaming sink for a single object.
///
/// Bytes written are buffered or staged by the backend; the object is only
/// published by [`finish`](ObjectWriter::finish).
pub trait ObjectWriter: Write + Send {
    /// Flushes, closes and publishes the object.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Line reader type handed out by [`ObjectStore::open_reader`].
pub type ObjectReader = Box<dyn BufRead + Send>;

/// Operations the ingestion pipeline needs from an object store.
pub trait ObjectStore: Send + Sync {
    /// Returns `true` if `container/name` currently exists.
    fn exists(&self, container: &str, name: &str) -> Result<bool>;

    /// Returns the generation of `container/name`, or `None` if absent.
    fn generation(&self, container: &str, name: &str) -> Result<Option<u64>>;

    /// Opens a buffered line reader over an existing object.
    fn open_reader(&self, container: &str, name: &str) -> Result<ObjectReader>;

    /// Opens a writer that creates or overwrites `container/name` on finish.
    fn open_writer(&self, container: &str, name: &str) -> Result<Box<dyn ObjectWriter>>;

    /// Deletes an existing object.
    fn delete(&self, container: &str, name: &str) -> Result<()>;

    /// Moves `old` to `new` inside one container, replacing any object at
    /// `new`.
    fn rename(&self, container: &str, old: &str, new: &str) -> Result<ObjectHandle>;

    /// Deletes `container/name` only if its generation is `generation`.
    ///
    /// This default checks and then deletes, so a replacement landing
    /// between the two calls is deleted too. Backends that can test and
    /// delete in one step override it.
    ///
    /// # Errors
    ///
    /// [`StorageError::PreconditionFailed`] if the object is absent or at
    /// another generation; nothing is deleted then.
    fn delete_if_generation(&self, container: &str, name: &str, generation: u64) -> Result<()> {
        let found = self.generation(container, name)?;
        if found != Some(generation) {
            return Err(StorageError::precondition(container, name, Some(generation), found));
        }
        self.delete(container, name)
    }

    /// Moves `old` to `new` only if `old` is still at `old_generation` and
    /// nothing exists at `new`.
    ///
    /// Like [`delete_if_generation`](Self::delete_if_generation), the
    /// default is check-then-act.
    ///
    /// # Errors
    ///
    /// [`StorageError::PreconditionFailed`] naming whichever object failed
    /// its check; nothing is moved then.
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
        if let Some(taken) = self.generation(container, new)? {
            return Err(StorageError::precondition(container, new, None, Some(taken)));
        }
        self.rename(container, old, new)
    }

    /// Lists object names in a container in ascending order. A container
    /// that was never written to is empty.
    fn list(&self, container: &str) -> Result<Vec<String>>;

    /// Deletes every object in `container`. Returns how many were removed.
    fn delete_all(&self, container: &str) -> Result<usize> {
        let names = self.list(container)?;
        for name in &names {
            self.delete(container, name)?;
        }
        Ok(names.len())
    }
}

/// Reads a whole object into a string. Only meant for small objects.
pub fn read_to_string(store: &dyn ObjectStore, container: &str, name: &str) -> Result<String> {
    let mut reader = store.open_reader(container, name)?;
    let mut out = String::new();
    reader.read_to_string(&mut out)?;
    Ok(out)
}

/// Writes `contents` as a complete object.
pub fn write_all(store: &dyn ObjectStore, container: &str, name: &str, contents: &[u8]) -> Result<()> {
    let mut writer = store.open_writer(container, name)?;
    writer.write_all(contents)?;
    writer.finish()
}
