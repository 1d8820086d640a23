//! Gap filling: inserts placeholder records for missing time slots.
//!
//! Samples are expected every `gap_step` time units. Between two consecutive
//! records of the merged stream:
//!
//! - a distance that is not a multiple of the step is an error;
//! - missing slots below `gap_split` are filled with `"<ts>,-1"`;
//! - a gap of at least `gap_split` closes the current segment and starts a
//!   new object named after the record that follows the gap.
use anyhow::{bail, Context, Result};
use log::{debug, info};
use normalize::NormalizedRecord;
use std::io::{BufRead, Write};

use config::IngestConfig;
use storage::{ObjectStore, ObjectWriter};

/// Value written for a missing slot.
pub const GAP_VALUE: i64 = -1;

/// What one gap-filling run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapFillReport {
    /// Segment objects written, in order.
    pub segments: Vec<String>,
    /// Records copied from the merged stream.
    pub records: usize,
    /// Placeholder records inserted.
    pub filled: usize,
}

/// Name of the segment object starting at `timestamp`.
#[must_use]
pub fn segment_name(timestamp: i64) -> String {
    format!("ecg_{}.csv", timestamp)
}

struct Segment {
    name: String,
    writer: Box<dyn ObjectWriter>,
}

impl Segment {
    fn open(store: &dyn ObjectStore, container: &str, first: i64) -> Result<Self> {
        let name = segment_name(first);
        let writer = store
            .open_writer(container, &name)
            .with_context(|| format!("failed to open segment {}/{}", container, name))?;
        debug!("opened segment {}/{}", container, name);
        Ok(Self { name, writer })
    }

    fn write(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .with_context(|| format!("failed to write segment {}", self.name))
    }

    fn finish(self) -> Result<String> {
        self.writer
            .finish()
            .with_context(|| format!("failed to publish segment {}", self.name))?;
        Ok(self.name)
    }
}

/// Fills gaps in `source_container/source_name` and writes the segments to
/// the configured gap-fill container.
///
/// Only the canonical merged object is processed; for any other name this
/// returns `Ok(None)` without touching storage. The destination container is
/// cleared before the first segment is written.
///
/// # Errors
///
/// Storage failures, unparseable merged lines, or a timestamp distance that
/// is not a multiple of the step.
pub fn fill_gaps(
    store: &dyn ObjectStore,
    config: &IngestConfig,
    source_container: &str,
    source_name: &str,
) -> Result<Option<GapFillReport>> {
    if source_name != config.merged_name {
        debug!("ignoring {}/{} (not the merged stream)", source_container, source_name);
        return Ok(None);
    }
    info!("filling gaps in {}/{}", source_container, source_name);

    let removed = store.delete_all(&config.gaps_container)?;
    debug!("cleared {} objects from {}", removed, config.gaps_container);

    let mut reader = store
        .open_reader(source_container, source_name)
        .with_context(|| format!("failed to open {}/{}", source_container, source_name))?;

    let step = config.gap_step;
    let mut report = GapFillReport::default();
    let mut segment: Option<Segment> = None;
    // Previous record: its timestamp and its line exactly as read.
    let mut prev: Option<(i64, String)> = None;
    let mut line = String::new();
    let mut line_num = 0usize;

    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .with_context(|| format!("failed to read merged line {}", line_num + 1))?;
        if n == 0 {
            break;
        }
        line_num += 1;
        let curr_ts = NormalizedRecord::parse(&line)
            .with_context(|| format!("merged line {}", line_num))?
            .timestamp;

        let Some((prev_ts, prev_line)) = prev.take() else {
            segment = Some(Segment::open(store, &config.gaps_container, curr_ts)?);
            prev = Some((curr_ts, line.clone()));
            continue;
        };

        if let Some(seg) = segment.as_mut() {
            seg.write(&prev_line)?;
        }
        report.records += 1;

        let Some(diff) = curr_ts.checked_sub(prev_ts) else {
            bail!(
                "distance between timestamps {} and {} does not fit in i64",
                prev_ts,
                curr_ts
            );
        };
        if diff.rem_euclid(step) != 0 {
            bail!(
                "timestamps {} and {} are {} apart, not a multiple of {}",
                prev_ts,
                curr_ts,
                diff,
                step
            );
        }

        if diff / step - 1 > 0 {
            if diff < config.gap_split {
                if let Some(seg) = segment.as_mut() {
                    let mut t = prev_ts + step;
                    while t < curr_ts {
                        seg.write(&format!("{},{}\n", t, GAP_VALUE))?;
                        report.filled += 1;
                        t += step;
                    }
                }
            } else {
                if let Some(seg) = segment.take() {
                    report.segments.push(seg.finish()?);
                }
                segment = Some(Segment::open(store, &config.gaps_container, curr_ts)?);
            }
        }

        prev = Some((curr_ts, line.clone()));
    }

    if let (Some(mut seg), Some((_, last))) = (segment, prev) {
        seg.write(&last)?;
        report.records += 1;
        report.segments.push(seg.finish()?);
    }

    info!(
        "gap fill wrote {} segments ({} records, {} placeholders)",
        report.segments.len(),
        report.records,
        report.filled
    );
    Ok(Some(report))
}
