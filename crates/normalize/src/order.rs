use std::cmp::Ordering;

use config::OrderKind;

/// Comparison of serialized record lines.
///
/// The batch sort and the merge both go through this trait so the two sides
/// of a merge can never disagree on ordering.
pub trait LineOrder {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

impl LineOrder for OrderKind {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            OrderKind::Lexicographic => a.as_bytes().cmp(b.as_bytes()),
            OrderKind::Numeric => match (leading_timestamp(a), leading_timestamp(b)) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.as_bytes().cmp(b.as_bytes())),
                // Lines without a numeric timestamp go after all numeric ones.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.as_bytes().cmp(b.as_bytes()),
            },
        }
    }
}

fn leading_timestamp(line: &str) -> Option<i64> {
    line.split(',').next()?.trim().parse().ok()
}
