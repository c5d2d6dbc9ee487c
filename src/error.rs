/// Precondition failures on a [`Bin`](crate::types::Bin).
///
/// These signal a bug in the calling stage (scores read before the scoring stage ran, a metric
/// set twice, a zero-length bin), never a recoverable condition.
#[derive(Debug, thiserror::Error)]
pub enum BinError {
    /// Completeness, contamination or score was read before `add_quality` was called.
    #[error("Bin {bin} has no quality assigned yet")]
    NotScored { bin: String },

    /// Length or N50 was read before being set.
    #[error("Bin {bin} has no {metric} assigned yet")]
    MissingMetric { bin: String, metric: &'static str },

    /// Length and N50 must be strictly positive.
    #[error("Invalid {metric} for bin {bin}: {value}")]
    InvalidMetric {
        bin: String,
        metric: &'static str,
        value: u64,
    },

    /// A one-time setter was called twice.
    #[error("{metric} is already set for bin {bin}")]
    AlreadySet { bin: String, metric: &'static str },

    #[error("Contamination weight must be a non-negative number, got {0}")]
    InvalidWeight(f64),

    /// Re-indexing met a contig that is missing from the index.
    #[error("Contig {contig} of bin {bin} is not in the contig index")]
    UnknownContig { bin: String, contig: String },
}
