//! # Config - SensorFold ingestion settings
//!
//! Every container and object name the pipeline touches is a fixed
//! identifier. They live here so the engine, the downstream passes and the
//! CLI agree on them.
//!
//! ## Environment
//!
//! ```text
//! SENSORFOLD_ROOT            storage root directory      (default: "data")
//! SENSORFOLD_OUTPUT          merged-stream container     (default: "merged-formatted-csv-file")
//! SENSORFOLD_MERGED_NAME     canonical merged object     (default: "merged.csv")
//! SENSORFOLD_STAGING_NAME    staging object              (default: "merged-tmp.csv")
//! SENSORFOLD_GAPS_OUTPUT     gap-filled container        (default: "blanks-filled-in-csv-file")
//! SENSORFOLD_ECG_OUTPUT      ECG container               (default: "innovation-ecg-files")
//! SENSORFOLD_GAP_STEP        slot width between samples  (default: 8)
//! SENSORFOLD_GAP_SPLIT       gap that starts a new file  (default: 30000)
//! SENSORFOLD_ORDER           "lexicographic" | "numeric" (default: "lexicographic")
//! SENSORFOLD_COMMIT_RETRIES  merges retried on conflict  (default: 3)
//! SENSORFOLD_DEDUP           skip redelivered objects    (default: "false")
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Ordering applied to serialized record lines, both when sorting a batch and
/// when merging it into the merged stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderKind {
    /// Byte order of the full line. Only chronological while every timestamp
    /// has the same number of digits.
    #[default]
    Lexicographic,
    /// Leading timestamp field compared as an `i64`.
    ///
    /// A merged stream is only valid under the order it was written with.
    /// Switching an existing stream to this order makes the next merge fail
    /// as soon as it reads two lines out of order; rewrite the stream first.
    Numeric,
}

impl FromStr for OrderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexicographic" | "lex" => Ok(Self::Lexicographic),
            "numeric" => Ok(Self::Numeric),
            other => bail!("unknown line order '{}' (expected lexicographic or numeric)", other),
        }
    }
}

/// Settings shared by every stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Root directory for the filesystem storage backend.
    pub root: PathBuf,
    /// Container holding the merged stream and its staging object.
    pub output_container: String,
    /// Canonical merged stream object name.
    pub merged_name: String,
    /// Staging name prefix. Each merge attempt writes
    /// `<staging_name>.<pid>-<seq>` and commits it over the merged stream.
    pub staging_name: String,
    /// Destination container of the gap-filling pass.
    pub gaps_container: String,
    /// Destination container of the ECG conversion pass.
    pub ecg_container: String,
    /// Expected distance between consecutive timestamps.
    pub gap_step: i64,
    /// Gaps at or above this distance start a new output object instead of
    /// being filled.
    pub gap_split: i64,
    pub order: OrderKind,
    /// How many times a merge is redone after a commit conflict.
    pub commit_retries: usize,
    /// When `true`, raw objects already recorded in the ingest ledger are
    /// skipped instead of merged again.
    pub dedup: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            output_container: "merged-formatted-csv-file".to_string(),
            merged_name: "merged.csv".to_string(),
            staging_name: "merged-tmp.csv".to_string(),
            gaps_container: "blanks-filled-in-csv-file".to_string(),
            ecg_container: "innovation-ecg-files".to_string(),
            gap_step: 8,
            gap_split: 30_000,
            order: OrderKind::Lexicographic,
            commit_retries: 3,
            dedup: false,
        }
    }
}

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Reads and parses an environment value, falling back to `default` when the
/// variable is unset. A set but unparseable value is an error.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}: {}", key, e))
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl IngestConfig {
    /// Builds a config from `SENSORFOLD_*` environment variables on top of
    /// [`IngestConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse,
    /// or if the gap step is not positive.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let cfg = Self {
            root: PathBuf::from(env_or("SENSORFOLD_ROOT", &d.root.to_string_lossy())),
            output_container: env_or("SENSORFOLD_OUTPUT", &d.output_container),
            merged_name: env_or("SENSORFOLD_MERGED_NAME", &d.merged_name),
            staging_name: env_or("SENSORFOLD_STAGING_NAME", &d.staging_name),
            gaps_container: env_or("SENSORFOLD_GAPS_OUTPUT", &d.gaps_container),
            ecg_container: env_or("SENSORFOLD_ECG_OUTPUT", &d.ecg_container),
            gap_step: env_parse("SENSORFOLD_GAP_STEP", d.gap_step)?,
            gap_split: env_parse("SENSORFOLD_GAP_SPLIT", d.gap_split)?,
            order: env_parse("SENSORFOLD_ORDER", d.order)?,
            commit_retries: env_parse("SENSORFOLD_COMMIT_RETRIES", d.commit_retries)?,
            dedup: env_parse("SENSORFOLD_DEDUP", d.dedup)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.gap_step > 0, "gap step must be positive, got {}", self.gap_step);
        anyhow::ensure!(
            self.merged_name != self.staging_name,
            "merged and staging object names must differ ({})",
            self.merged_name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests;
