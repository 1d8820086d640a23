//! # Engine - SensorFold ingestion
//!
//! Ties the [`normalize`], [`merge`] and [`storage`] crates into the
//! per-upload ingestion path: every raw object is normalized into a sorted
//! batch and folded into one growing, globally ordered merged stream.
//!
//! ## Architecture
//!
//! ```text
//! RawEvent {container, name}
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                  INGESTOR                     │
//! │                                               │
//! │ ingest.rs → read raw → Normalizer → batch     │
//! │              |                                │
//! │              v                                │
//! │  observe merged generation, open staging      │
//! │              |                                │
//! │              v                                │
//! │  merge_into(existing merged, batch) → staging │
//! │              |                                │
//! │              v                                │
//! │ commit.rs → delete merged, rename staging     │
//! │              |  (conflict? redo the merge)    │
//! │              v                                │
//! │ ledger.rs → record the raw object (optional)  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | [`lib.rs`]   | `Ingestor`, `RawEvent`, `IngestReport`, accessors     |
//! | [`ingest`]   | `ingest()` with conflict retry                        |
//! | [`commit`]   | generation-checked delete + rename                    |
//! | [`ledger`]   | CRC32 record of ingested raw objects                  |
//! | [`queue`]    | single writer thread serializing merges               |
//!
//! ## Concurrency
//!
//! The merged stream is one shared object. Two merges that read the same
//! version and both commit would lose the first one's records. Inside a
//! process, [`MergeQueue`] runs every merge on one thread. Across processes,
//! every attempt stages under its own name and [`commit()`] refuses to
//! replace an object whose generation moved; the ingestor then redoes the
//! merge against the new version. These checks are not atomic with the
//! delete and rename: a writer that starts while the old stream is deleted
//! and the new one not yet renamed sees a first ingestion, and the commit it
//! races fails with [`CommitError::Displaced`].
mod commit;
mod ingest;
mod ledger;
mod queue;

use std::sync::Arc;

use config::IngestConfig;
use normalize::Normalizer;
use storage::ObjectStore;

pub use commit::{commit, CommitError};
pub use ledger::{Ledger, LedgerKey, LEDGER_NAME};
pub use queue::MergeQueue;

/// A raw object that triggered ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub container: String,
    pub name: String,
}

impl RawEvent {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

/// Outcome of one [`Ingestor::ingest`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Records already in the merged stream before this ingestion.
    pub existing_lines: usize,
    /// Records contributed by the raw object.
    pub batch_lines: usize,
    /// Records in the new merged stream.
    pub written_lines: usize,
    /// Generation of the committed merged stream (`None` when skipped).
    pub generation: Option<u64>,
    /// Merge attempts made, including ones lost to conflicts.
    pub attempts: usize,
    /// CRC32 of the raw object's bytes.
    pub fingerprint: u32,
    /// `true` if the ledger already listed this raw object.
    pub skipped_duplicate: bool,
}

/// Runs ingestions against one object store.
pub struct Ingestor {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) config: IngestConfig,
    pub(crate) normalizer: Normalizer,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("output_container", &self.config.output_container)
            .field("merged_name", &self.config.merged_name)
            .field("staging_name", &self.config.staging_name)
            .field("order", &self.config.order)
            .field("commit_retries", &self.config.commit_retries)
            .field("dedup", &self.config.dedup)
            .finish()
    }
}

impl Ingestor {
    /// Creates an ingestor writing the merged stream described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(store: Arc<dyn ObjectStore>, config: IngestConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let normalizer = Normalizer::new(config.order);
        Ok(Self {
            store,
            config,
            normalizer,
        })
    }

    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests;
