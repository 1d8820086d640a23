//! # Merge - incremental external merge
//!
//! Folds one in-memory [`SortedBatch`] into the existing merged stream and
//! writes the combined, still-sorted result to a new sink.
//!
//! ```text
//!  existing merged stream (streamed, one line resident)
//!          │
//!          ▼
//!   ┌──────────────┐      ┌───────────────┐
//!   │ MergeIterator│◄─────│  SortedBatch  │ (fully buffered)
//!   └──────┬───────┘      └───────────────┘
//!          ▼
//!    staging sink (Write)
//! ```
//!
//! ## Guarantees
//!
//! - Output holds exactly `existing + batch` lines. Nothing is deduplicated
//!   or dropped.
//! - Output is non-decreasing under the batch's [`OrderKind`].
//! - On equal lines the batch line is emitted first.
//! - Memory is bounded by the batch; the existing side is read one line at a
//!   time.
//!
//! Any read or write failure aborts the merge. The caller decides what to
//! do with a half-written sink.

mod merge;
mod writer;

pub use config::OrderKind;
pub use merge::{MergeIterator, Side};
pub use normalize::SortedBatch;
pub use writer::{merge_into, MergeStats};

#[cfg(test)]
mod tests;
