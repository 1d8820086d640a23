//! Ingest path: raw object → sorted batch → merge → commit.
//!
//! Every step runs sequentially on the calling thread. The first storage
//! failure aborts the call and leaves storage as it was at that point; a
//! redelivered event simply runs the whole path again.
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use normalize::SortedBatch;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use storage::ObjectHandle;

use crate::commit::{commit, CommitError};
use crate::ledger::{Ledger, LedgerKey};
use crate::{IngestReport, Ingestor, RawEvent};

impl Ingestor {
    /// Folds the raw object named by `event` into the merged stream.
    ///
    /// # Steps
    ///
    /// 1. Read the raw object and fingerprint it.
    /// 2. If deduplication is on and the ledger lists the object, stop.
    /// 3. Normalize into a [`SortedBatch`].
    /// 4. Merge against the current merged stream into a staging object of
    ///    this attempt and commit. When the commit loses a race before
    ///    touching the merged stream, redo this step, at most
    ///    `commit_retries` more times.
    /// 5. Reload the ledger and record the object (deduplication only).
    ///
    /// Without deduplication, ingesting the same object twice stores its
    /// records twice.
    ///
    /// # Errors
    ///
    /// Any storage failure, or a conflict that persists past the retry
    /// budget.
    pub fn ingest(&self, event: &RawEvent) -> Result<IngestReport> {
        info!("processing {}/{}", event.container, event.name);

        let mut raw = Vec::new();
        self.store
            .open_reader(&event.container, &event.name)
            .and_then(|mut r| r.read_to_end(&mut raw).map_err(Into::into))
            .with_context(|| format!("failed to read raw object {}/{}", event.container, event.name))?;
        let key = LedgerKey::new(&event.container, &event.name, &raw);

        if self.config.dedup {
            let ledger = Ledger::load(self.store.as_ref(), &self.config.output_container)?;
            if ledger.contains(&key) {
                info!("skipping {} (already ingested)", key);
                return Ok(IngestReport {
                    existing_lines: 0,
                    batch_lines: 0,
                    written_lines: 0,
                    generation: None,
                    attempts: 0,
                    fingerprint: key.crc,
                    skipped_duplicate: true,
                });
            }
        }

        let batch = self
            .normalizer
            .normalize(Cursor::new(raw))
            .with_context(|| format!("failed to normalize {}/{}", event.container, event.name))?;

        let max_attempts = self.config.commit_retries + 1;
        let mut attempt = 0;
        let (stats, handle) = loop {
            attempt += 1;
            match self.merge_and_commit(batch.clone()) {
                Ok(done) => break done,
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    warn!("attempt {}/{} lost a commit race: {:#}", attempt, max_attempts, e);
                }
                Err(e) => return Err(e),
            }
        };

        if self.config.dedup {
            // Reload so entries other writers added during the merge survive.
            let mut ledger = Ledger::load(self.store.as_ref(), &self.config.output_container)?;
            if !ledger.add(key.clone()) {
                warn!("{} was recorded by another writer during this merge", key);
            }
            ledger.save(self.store.as_ref(), &self.config.output_container)?;
        }

        info!(
            "merged {} records into {}/{} ({} total, generation {})",
            stats.batch_lines,
            self.config.output_container,
            self.config.merged_name,
            stats.written_lines,
            handle.generation
        );

        Ok(IngestReport {
            existing_lines: stats.existing_lines,
            batch_lines: stats.batch_lines,
            written_lines: stats.written_lines,
            generation: Some(handle.generation),
            attempts: attempt,
            fingerprint: key.crc,
            skipped_duplicate: false,
        })
    }

    /// One merge against the merged stream as it is now, followed by commit.
    ///
    /// Each attempt stages to its own object so concurrent writers never
    /// share a staging name. When the commit fails before touching the
    /// canonical object the staging object is removed again.
    fn merge_and_commit(&self, batch: SortedBatch) -> Result<(merge::MergeStats, ObjectHandle)> {
        let cfg = &self.config;
        let store = self.store.as_ref();
        let staging = attempt_staging_name(&cfg.staging_name);

        let expected = store.generation(&cfg.output_container, &cfg.merged_name)?;
        let existing = match expected {
            Some(_) => Some(
                store
                    .open_reader(&cfg.output_container, &cfg.merged_name)
                    .with_context(|| format!("failed to open {}/{}", cfg.output_container, cfg.merged_name))?,
            ),
            None => {
                info!("no {}/{} yet, first ingestion", cfg.output_container, cfg.merged_name);
                None
            }
        };

        let mut writer = store
            .open_writer(&cfg.output_container, &staging)
            .with_context(|| format!("failed to open staging {}/{}", cfg.output_container, staging))?;
        let stats = merge::merge_into(existing, batch, writer.as_mut())?;
        writer
            .finish()
            .with_context(|| format!("failed to publish staging {}/{}", cfg.output_container, staging))?;
        let staged = store
            .generation(&cfg.output_container, &staging)?
            .ok_or_else(|| anyhow!("staging {}/{} vanished after upload", cfg.output_container, staging))?;

        match commit(
            store,
            &cfg.output_container,
            &staging,
            staged,
            &cfg.merged_name,
            expected,
        ) {
            Ok(handle) => Ok((stats, handle)),
            Err(e) => {
                if e.is_retryable() {
                    if let Err(cleanup) = store.delete_if_generation(&cfg.output_container, &staging, staged) {
                        debug!("left staging {}/{} behind: {}", cfg.output_container, staging, cleanup);
                    }
                }
                Err(e.into())
            }
        }
    }
}

/// Distinguishes staging objects of concurrent attempts, in this process
/// and others.
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<staging>.<pid>-<seq>`, unique per merge attempt.
pub(crate) fn attempt_staging_name(staging: &str) -> String {
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}.{}-{}", staging, std::process::id(), seq)
}

fn is_retryable(e: &anyhow::Error) -> bool {
    e.downcast_ref::<CommitError>()
        .map_or(false, CommitError::is_retryable)
}
