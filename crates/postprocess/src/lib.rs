//! # Postprocess - passes run over the merged stream
//!
//! Both passes are stateless line transforms over one object.
//!
//! | Pass                | Input                 | Output                           |
//! |---------------------|-----------------------|----------------------------------|
//! | [`fill_gaps`]       | merged stream         | `ecg_<ts>.csv` segments, gaps as `-1` |
//! | [`convert_to_ecg`]  | one gap-filled segment | same name with `csv` → `ecg`, values only |

mod ecg;
mod gaps;

pub use ecg::{convert_to_ecg, ecg_name, strip_timestamps};
pub use gaps::{fill_gaps, segment_name, GapFillReport, GAP_VALUE};

#[cfg(test)]
mod tests;
