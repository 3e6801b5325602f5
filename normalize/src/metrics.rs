use std::collections::HashMap;
use serde::{Deserialize, Serialize};

///
/// Per-produced-file record emitted by a writer when it closes. Sums are
/// associative and a neutral zero value exists, so file metrics can be folded
/// per-table or per-run with a plain `fold`/`sum`.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WriterMetrics {
    pub file_path: String,
    pub items_count: u64,
    pub bytes: u64,
    pub created_at: i64,       // millis since epoch (UTC)
    pub last_modified_at: i64, // millis since epoch (UTC)
}

impl WriterMetrics {
    pub fn zero() -> Self {
        Self::default()
    }

    ///
    /// Combine two metrics for the same (or a fresh) file. `created_at` is the
    /// earlier of the two, `last_modified_at` the later - this keeps the sum
    /// meaningful even when folding metrics for distinct files into a running
    /// per-table total.
    ///
    pub fn combine(&self, other: &WriterMetrics) -> WriterMetrics {
        let file_path = if self.file_path.is_empty() { other.file_path.clone() } else { self.file_path.clone() };
        WriterMetrics {
            file_path,
            items_count: self.items_count + other.items_count,
            bytes: self.bytes + other.bytes,
            created_at: match (self.created_at, other.created_at) {
                (0, b) => b,
                (a, 0) => a,
                (a, b) => a.min(b),
            },
            last_modified_at: self.last_modified_at.max(other.last_modified_at),
        }
    }
}

impl std::iter::Sum for WriterMetrics {
    fn sum<I: Iterator<Item = WriterMetrics>>(iter: I) -> Self {
        iter.fold(WriterMetrics::zero(), |acc, m| acc.combine(&m))
    }
}

///
/// Remove duplicate entries for the same `file_path`, keeping the last one seen.
///
/// A retried worker's earlier output files are deleted on disk, but the metrics
/// drained from its first, failed attempt (via the `NormalizeJobFailed` cleanup
/// path) may already be sitting in the mapper's running summary. Deduplicating
/// by path before aggregation avoids double-counting items/bytes for those files
/// (see the "parallel conflict retry and metric double-counting" open question).
///
pub fn dedupe_by_file_path(metrics: Vec<WriterMetrics>) -> Vec<WriterMetrics> {
    let mut by_path: HashMap<String, WriterMetrics> = HashMap::new();
    for m in metrics {
        by_path.insert(m.file_path.clone(), m);
    }
    by_path.into_values().collect()
}
