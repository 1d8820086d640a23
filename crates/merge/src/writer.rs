use anyhow::{Context, Result};
use log::debug;
use normalize::SortedBatch;
use std::io::{BufRead, Write};

use crate::MergeIterator;

/// Line counts of one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Lines taken from the existing merged stream.
    pub existing_lines: usize,
    /// Lines taken from the batch.
    pub batch_lines: usize,
    /// Lines written to the sink; always `existing_lines + batch_lines`.
    pub written_lines: usize,
}

/// Streams the merge of `existing` and `batch` into `out`, then flushes it.
///
/// With `existing == None` (no merged stream yet) the batch is written as
/// is. Otherwise the two sides are interleaved by [`MergeIterator`].
///
/// The sink is not closed or published here; the caller owns that step so a
/// failed merge never replaces anything.
///
/// # Errors
///
/// Returns an error on the first failed read of the existing stream or the
/// first failed write to `out`.
pub fn merge_into<R, W>(existing: Option<R>, batch: SortedBatch, out: &mut W) -> Result<MergeStats>
where
    R: BufRead,
    W: Write + ?Sized,
{
    let first_ingestion = existing.is_none();
    let mut merge = MergeIterator::new(existing, batch)?;
    let mut written = 0usize;

    while let Some(line) = merge.next_line()? {
        out.write_all(line.as_bytes())
            .with_context(|| format!("failed to write merged line {}", written + 1))?;
        written += 1;
    }
    out.flush().context("failed to flush merged output")?;

    let stats = MergeStats {
        existing_lines: merge.existing_lines(),
        batch_lines: merge.batch_lines(),
        written_lines: written,
    };
    debug!(
        "merge done (first_ingestion={}, existing={}, batch={}, written={})",
        first_ingestion, stats.existing_lines, stats.batch_lines, stats.written_lines
    );
    Ok(stats)
}
