//! # Normalize - raw sensor lines to a sorted batch
//!
//! Turns one raw upload into a [`SortedBatch`]: the in-memory, sorted set of
//! record lines that the merge engine folds into the merged stream.
//!
//! ## Raw input
//!
//! Each raw line holds alternating `timestamp,value` tokens:
//!
//! ```text
//! 1000,12,1008,-40,1016,7
//! ```
//!
//! Pairs are walked left to right. The rest of a line is dropped at the
//! first pair with an empty token or a token that is not an integer; a
//! trailing unpaired token is ignored. Neither case is an error.
//!
//! ## Record lines
//!
//! Every reading becomes one line `"<timestamp>,<quantized>\n"` with the
//! value quantized into `[0, 1023]` (see [`quantize`]). Lines are sorted by
//! the configured [`OrderKind`]; with the default lexicographic order that
//! is chronological only while all timestamps have the same digit count.

mod batch;
mod order;
mod record;

pub use batch::{Normalizer, SortedBatch};
pub use config::OrderKind;
pub use order::LineOrder;
pub use record::{parse_line, quantize, NormalizedRecord, SensorSample, QUANT_MAX, QUANT_MIN};
