//! Two-way merge of a streamed existing side with an in-memory batch.
use anyhow::{bail, Context, Result};
use normalize::{LineOrder, SortedBatch};
use std::cmp::Ordering;
use std::io::BufRead;

/// Which input a merged line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Existing,
    Batch,
}

/// Merges an optional existing line stream with a [`SortedBatch`].
///
/// The existing side is read lazily, one line ahead (`cursor`). The batch is
/// consumed from the front. Lines are yielded with their trailing `\n`,
/// exactly as read or buffered. The one exception is a final existing line
/// without `\n` that batch lines still follow: it gets a `\n` appended so
/// the next record starts on its own line.
pub struct MergeIterator<R> {
    /// `None` when there is no existing stream (first ingestion).
    existing: Option<R>,
    /// Next unread line of the existing side; `None` once it is exhausted.
    cursor: Option<String>,
    batch: SortedBatch,
    existing_lines: usize,
    batch_lines: usize,
}

impl<R: BufRead> MergeIterator<R> {
    /// Creates the iterator and reads the first existing line.
    ///
    /// # Errors
    ///
    /// Returns an error if that first read fails.
    pub fn new(existing: Option<R>, batch: SortedBatch) -> Result<Self> {
        let mut iter = Self {
            existing,
            cursor: None,
            batch,
            existing_lines: 0,
            batch_lines: 0,
        };
        iter.advance_cursor()?;
        Ok(iter)
    }

    /// Reads the next existing line into `cursor`.
    fn advance_cursor(&mut self) -> Result<()> {
        let reader = match self.existing.as_mut() {
            Some(r) => r,
            None => {
                self.cursor = None;
                return Ok(());
            }
        };

        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .with_context(|| format!("failed to read merged stream line {}", self.existing_lines + 1))?;
        if n == 0 {
            // Drop the reader so later calls never touch it again.
            self.existing = None;
            self.cursor = None;
        } else {
            self.cursor = Some(line);
        }
        Ok(())
    }

    /// Returns the next line in merged order with the side it came from, or
    /// `None` when both sides are exhausted.
    ///
    /// The existing line is emitted only when it is strictly smaller than
    /// the batch head; ties go to the batch.
    ///
    /// # Errors
    ///
    /// Read failures, and an existing stream that is out of order under the
    /// batch's order (for example one written lexicographically and read
    /// back with [`OrderKind::Numeric`](normalize::OrderKind::Numeric)).
    pub fn next_entry(&mut self) -> Result<Option<(Side, String)>> {
        let take_existing = match (self.cursor.as_deref(), self.batch.front()) {
            (None, None) => return Ok(None),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(cursor), Some(head)) => self.batch.order().compare(cursor, head) == Ordering::Less,
        };

        if take_existing {
            let mut line = self.cursor.take().unwrap_or_default();
            self.existing_lines += 1;
            self.advance_cursor()?;
            if let Some(next) = self.cursor.as_deref() {
                let (next, prev) = (next.trim_end_matches('\n'), line.trim_end_matches('\n'));
                if self.batch.order().compare(next, prev) == Ordering::Less {
                    bail!(
                        "merged stream line {} sorts before line {} under {:?} order",
                        self.existing_lines + 1,
                        self.existing_lines,
                        self.batch.order()
                    );
                }
            }
            // An unterminated tail only stays unterminated if nothing follows it.
            if !line.ends_with('\n') && !self.batch.is_empty() {
                line.push('\n');
            }
            Ok(Some((Side::Existing, line)))
        } else {
            let line = self.batch.pop_front().unwrap_or_default();
            self.batch_lines += 1;
            Ok(Some((Side::Batch, line)))
        }
    }

    /// Like [`next_entry`](Self::next_entry) without the side.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.next_entry()?.map(|(_, line)| line))
    }

    /// Collects all remaining lines into a `Vec`.
    ///
    /// Useful for tests; production code streams through
    /// [`merge_into`](crate::merge_into).
    pub fn collect_all(&mut self) -> Result<Vec<String>> {
        let mut result = Vec::new();
        while let Some(line) = self.next_line()? {
            result.push(line);
        }
        Ok(result)
    }

    /// Existing lines emitted so far.
    #[must_use]
    pub fn existing_lines(&self) -> usize {
        self.existing_lines
    }

    /// Batch lines emitted so far.
    #[must_use]
    pub fn batch_lines(&self) -> usize {
        self.batch_lines
    }
}
