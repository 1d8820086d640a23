use anyhow::{Context, Result};
use log::debug;
use std::collections::VecDeque;
use std::io::BufRead;

use crate::order::LineOrder;
use crate::record::{parse_line, NormalizedRecord};
use config::OrderKind;

/// The sorted record lines derived from one raw upload.
///
/// Fully buffered; memory is bounded by the size of one upload, not by the
/// merged stream. Lines keep their trailing `\n` and are consumed from the
/// front by the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedBatch {
    lines: VecDeque<String>,
    order: OrderKind,
}

impl SortedBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new(order: OrderKind) -> Self {
        Self {
            lines: VecDeque::new(),
            order,
        }
    }

    /// Sorts `lines` under `order` and wraps them.
    #[must_use]
    pub fn from_lines<I, S>(lines: I, order: OrderKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        lines.sort_by(|a, b| order.compare(a, b));
        Self {
            lines: lines.into(),
            order,
        }
    }

    /// Builds a batch from records.
    #[must_use]
    pub fn from_records<I>(records: I, order: OrderKind) -> Self
    where
        I: IntoIterator<Item = NormalizedRecord>,
    {
        Self::from_lines(records.into_iter().map(|r| r.to_line()), order)
    }

    #[must_use]
    pub fn order(&self) -> OrderKind {
        self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The smallest remaining line.
    #[must_use]
    pub fn front(&self) -> Option<&str> {
        self.lines.front().map(String::as_str)
    }

    /// Removes and returns the smallest remaining line.
    pub fn pop_front(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    /// Ordered iterator over the remaining lines.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Parses raw uploads into sorted batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    order: OrderKind,
}

impl Normalizer {
    #[must_use]
    pub fn new(order: OrderKind) -> Self {
        Self { order }
    }

    /// Reads every line of `reader`, quantizes each sample and returns the
    /// sorted batch.
    ///
    /// Bytes that are not valid UTF-8 are replaced before parsing, so a bad
    /// line only loses its own samples.
    ///
    /// # Errors
    ///
    /// Only on I/O failure while reading.
    pub fn normalize<R: BufRead>(&self, mut reader: R) -> Result<SortedBatch> {
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        let mut raw_lines = 0usize;

        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("failed to read raw line {}", raw_lines + 1))?;
            if n == 0 {
                break;
            }
            raw_lines += 1;
            let line = String::from_utf8_lossy(&buf);
            lines.extend(
                parse_line(&line)
                    .into_iter()
                    .map(|s| NormalizedRecord::from_sample(s).to_line()),
            );
        }

        debug!("normalized {} raw lines into {} records", raw_lines, lines.len());
        Ok(SortedBatch::from_lines(lines, self.order))
    }
}
