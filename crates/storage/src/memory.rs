use std::collections::BTreeMap;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{ObjectHandle, ObjectReader, ObjectStore, ObjectWriter, Result, StorageError};

/// Record of a storage operation, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Exists { container: String, name: String },
    Generation { container: String, name: String },
    Read { container: String, name: String },
    Write { container: String, name: String, size: usize },
    Delete { container: String, name: String },
    Rename { container: String, old: String, new: String },
    List { container: String },
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    generation: u64,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(String, String), StoredObject>,
    next_generation: u64,
    operations: Vec<StorageOp>,
    /// Object names on which every operation fails.
    fail_names: Vec<String>,
    /// Object names whose readers fail after the given number of bytes.
    read_limits: BTreeMap<String, usize>,
    /// Object names that fail only when renamed away.
    fail_renames: Vec<String>,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn check(&self, container: &str, name: &str) -> Result<()> {
        if self.fail_names.iter().any(|n| injected(n, name)) {
            return Err(StorageError::Injected {
                container: container.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn generation(&self, container: &str, name: &str) -> Option<u64> {
        self.objects.get(&key(container, name)).map(|o| o.generation)
    }

    fn delete(&mut self, container: &str, name: &str) -> Result<()> {
        self.operations.push(StorageOp::Delete {
            container: container.to_string(),
            name: name.to_string(),
        });
        self.check(container, name)?;
        self.objects
            .remove(&key(container, name))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(container, name))
    }

    fn rename(&mut self, container: &str, old: &str, new: &str) -> Result<ObjectHandle> {
        self.operations.push(StorageOp::Rename {
            container: container.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        });
        self.check(container, old)?;
        self.check(container, new)?;
        if self.fail_renames.iter().any(|n| injected(n, old)) {
            return Err(StorageError::Injected {
                container: container.to_string(),
                name: old.to_string(),
            });
        }
        let mut obj = self
            .objects
            .remove(&key(container, old))
            .ok_or_else(|| StorageError::not_found(container, old))?;
        obj.generation = self.bump();
        let generation = obj.generation;
        self.objects.insert(key(container, new), obj);
        Ok(ObjectHandle {
            container: container.to_string(),
            name: new.to_string(),
            generation,
        })
    }
}

/// An injected name matches itself and any `<name>.<suffix>` derived from it.
fn injected(pattern: &str, name: &str) -> bool {
    name == pattern
        || name
            .strip_prefix(pattern)
            .map_or(false, |rest| rest.starts_with('.'))
}

fn key(container: &str, name: &str) -> (String, String) {
    (container.to_string(), name.to_string())
}

/// In-memory object store with an operation log and fault injection.
///
/// Clones share the same underlying objects, so a clone handed to the code
/// under test can be inspected from the test afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        lock(&self.inner)
    }

    /// Stores `contents` directly, bypassing the operation log.
    pub fn put(&self, container: &str, name: &str, contents: &[u8]) -> Result<u64> {
        let mut inner = self.lock()?;
        let generation = inner.bump();
        inner.objects.insert(
            key(container, name),
            StoredObject {
                data: contents.to_vec(),
                generation,
            },
        );
        Ok(generation)
    }

    /// Returns a copy of an object's contents, bypassing the operation log.
    pub fn get(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .ok()?
            .objects
            .get(&key(container, name))
            .map(|o| o.data.clone())
    }

    /// Returns an object's contents split into lines, each keeping its `\n`.
    pub fn lines(&self, container: &str, name: &str) -> Option<Vec<String>> {
        let data = self.get(container, name)?;
        let text = String::from_utf8_lossy(&data);
        Some(text.split_inclusive('\n').map(str::to_string).collect())
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<StorageOp> {
        self.lock().map(|i| i.operations.clone()).unwrap_or_default()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        if let Ok(mut i) = self.lock() {
            i.operations.clear();
        }
    }

    /// Makes every operation on objects called `name` (or `name.<suffix>`)
    /// fail.
    pub fn inject_failure(&self, name: impl Into<String>) {
        if let Ok(mut i) = self.lock() {
            i.fail_names.push(name.into());
        }
    }

    /// Makes readers over objects called `name` fail once `after_bytes` bytes
    /// have been returned.
    pub fn inject_read_failure(&self, name: impl Into<String>, after_bytes: usize) {
        if let Ok(mut i) = self.lock() {
            i.read_limits.insert(name.into(), after_bytes);
        }
    }

    /// Makes renames of objects called `name` fail while every other
    /// operation on them succeeds.
    pub fn inject_rename_failure(&self, name: impl Into<String>) {
        if let Ok(mut i) = self.lock() {
            i.fail_renames.push(name.into());
        }
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        if let Ok(mut i) = self.lock() {
            i.fail_names.clear();
            i.read_limits.clear();
            i.fail_renames.clear();
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> Result<MutexGuard<'_, Inner>> {
    inner
        .lock()
        .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("lock poisoned: {}", e))))
}

impl ObjectStore for MemoryStore {
    fn exists(&self, container: &str, name: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.operations.push(StorageOp::Exists {
            container: container.to_string(),
            name: name.to_string(),
        });
        inner.check(container, name)?;
        Ok(inner.objects.contains_key(&key(container, name)))
    }

    fn generation(&self, container: &str, name: &str) -> Result<Option<u64>> {
        let mut inner = self.lock()?;
        inner.operations.push(StorageOp::Generation {
            container: container.to_string(),
            name: name.to_string(),
        });
        inner.check(container, name)?;
        Ok(inner.generation(container, name))
    }

    fn open_reader(&self, container: &str, name: &str) -> Result<ObjectReader> {
        let mut inner = self.lock()?;
        inner.operations.push(StorageOp::Read {
            container: container.to_string(),
            name: name.to_string(),
        });
        inner.check(container, name)?;
        let data = inner
            .objects
            .get(&key(container, name))
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(container, name))?;

        let limit = inner
            .read_limits
            .iter()
            .find(|(pattern, _)| injected(pattern, name))
            .map(|(_, &limit)| limit);
        match limit {
            Some(limit) => Ok(Box::new(BufReader::new(FailingReader {
                inner: Cursor::new(data),
                remaining: limit,
            }))),
            None => Ok(Box::new(Cursor::new(data))),
        }
    }

    fn open_writer(&self, container: &str, name: &str) -> Result<Box<dyn ObjectWriter>> {
        self.lock()?.check(container, name)?;
        Ok(Box::new(MemoryObjectWriter {
            store: Arc::clone(&self.inner),
            container: container.to_string(),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    fn delete(&self, container: &str, name: &str) -> Result<()> {
        self.lock()?.delete(container, name)
    }

    fn rename(&self, container: &str, old: &str, new: &str) -> Result<ObjectHandle> {
        self.lock()?.rename(container, old, new)
    }

    fn delete_if_generation(&self, container: &str, name: &str, generation: u64) -> Result<()> {
        let mut inner = self.lock()?;
        let found = inner.generation(container, name);
        if found != Some(generation) {
            return Err(StorageError::precondition(container, name, Some(generation), found));
        }
        inner.delete(container, name)
    }

    fn rename_if_absent(
        &self,
        container: &str,
        old: &str,
        old_generation: u64,
        new: &str,
    ) -> Result<ObjectHandle> {
        let mut inner = self.lock()?;
        let found = inner.generation(container, old);
        if found != Some(old_generation) {
            return Err(StorageError::precondition(container, old, Some(old_generation), found));
        }
        if let Some(taken) = inner.generation(container, new) {
            return Err(StorageError::precondition(container, new, None, Some(taken)));
        }
        inner.rename(container, old, new)
    }

    fn list(&self, container: &str) -> Result<Vec<String>> {
        let mut inner = self.lock()?;
        inner.operations.push(StorageOp::List {
            container: container.to_string(),
        });
        Ok(inner
            .objects
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, n)| n.clone())
            .collect())
    }
}

/// Buffers the whole object and publishes it on finish.
struct MemoryObjectWriter {
    store: Arc<Mutex<Inner>>,
    container: String,
    name: String,
    buf: Vec<u8>,
}

impl Write for MemoryObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemoryObjectWriter {
    fn finish(self: Box<Self>) -> Result<()> {
        let store = Arc::clone(&self.store);
        let mut inner = lock(&store)?;
        inner.operations.push(StorageOp::Write {
            container: self.container.clone(),
            name: self.name.clone(),
            size: self.buf.len(),
        });
        inner.check(&self.container, &self.name)?;
        let generation = inner.bump();
        let this = *self;
        inner.objects.insert(
            (this.container, this.name),
            StoredObject {
                data: this.buf,
                generation,
            },
        );
        Ok(())
    }
}

/// Reader that errors once its byte budget is spent.
struct FailingReader {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }
        let cap = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..cap])?;
        if n == 0 {
            return Ok(0);
        }
        self.remaining -= n;
        Ok(n)
    }
}
