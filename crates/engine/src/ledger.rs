//! # Ledger - record of ingested raw objects
//!
//! Lets the ingestor recognise a raw object it has already merged, so a
//! redelivered trigger does not merge the same readings twice. Only consulted
//! when deduplication is enabled.
//!
//! ## Format
//!
//! A small text object next to the merged stream, one entry per line:
//!
//! ```text
//! # SensorFold ingest ledger
//! # Format: <crc32>:<container>/<name>
//! 9a0364b9:raw-uploads/batch-0001.csv
//! ```
//!
//! The CRC32 covers the raw object's bytes, so a re-upload under the same
//! name with different content is a new entry. Lines starting with `#` are
//! comments; empty lines are ignored.
//!
//! The ledger is saved after the merge commit. A crash between the two
//! leaves the batch merged but unrecorded, and a redelivery merges it again.
use anyhow::{bail, Context, Result};
use crc32fast::Hasher as Crc32;
use std::collections::BTreeSet;
use std::fmt;

use storage::ObjectStore;

/// Name of the ledger object inside the output container.
pub const LEDGER_NAME: &str = "ingested.ledger";

/// Identity of one ingested raw object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LedgerKey {
    pub crc: u32,
    pub container: String,
    pub name: String,
}

impl LedgerKey {
    /// Fingerprints raw object bytes.
    #[must_use]
    pub fn new(container: &str, name: &str, raw: &[u8]) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(raw);
        Self {
            crc: hasher.finalize(),
            container: container.to_string(),
            name: name.to_string(),
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let (crc, path) = line.split_once(':')?;
        let (container, name) = path.split_once('/')?;
        if container.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            crc: u32::from_str_radix(crc, 16).ok()?,
            container: container.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{}/{}", self.crc, self.container, self.name)
    }
}

/// In-memory copy of the ledger object.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: BTreeSet<LedgerKey>,
}

impl Ledger {
    /// Loads the ledger from `container`, or starts an empty one if the
    /// object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the object exists but cannot be read or parsed.
    pub fn load(store: &dyn ObjectStore, container: &str) -> Result<Self> {
        if !store.exists(container, LEDGER_NAME)? {
            return Ok(Self::default());
        }

        let text = storage::read_to_string(store, container, LEDGER_NAME)
            .with_context(|| format!("failed to read ledger {}/{}", container, LEDGER_NAME))?;
        let mut entries = BTreeSet::new();
        for (line_num, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match LedgerKey::parse(trimmed) {
                Some(key) => {
                    entries.insert(key);
                }
                None => bail!(
                    "ledger line {}: invalid format (expected '<crc32>:<container>/<name>'): {}",
                    line_num + 1,
                    trimmed
                ),
            }
        }
        Ok(Self { entries })
    }

    /// Writes the whole ledger back to `container`.
    pub fn save(&self, store: &dyn ObjectStore, container: &str) -> Result<()> {
        let mut out = String::from("# SensorFold ingest ledger\n# Format: <crc32>:<container>/<name>\n");
        for key in &self.entries {
            out.push_str(&key.to_string());
            out.push('\n');
        }
        storage::write_all(store, container, LEDGER_NAME, out.as_bytes())
            .with_context(|| format!("failed to write ledger {}/{}", container, LEDGER_NAME))?;
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, key: &LedgerKey) -> bool {
        self.entries.contains(key)
    }

    /// Records a key. Returns `false` if it was already present.
    pub fn add(&mut self, key: LedgerKey) -> bool {
        self.entries.insert(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
