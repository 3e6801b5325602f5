use thiserror::Error;
use crate::metrics::WriterMetrics;

///
/// Every failure mode a normalize run can hit. Workers wrap all of their own
/// exceptions as `NormalizeJobFailed`; the mapper distinguishes `CoercionConflict`
/// (recoverable, by retrying the losing worker) from every other cause (fatal,
/// propagated to the Spooler, which gets exactly one more recovery attempt by
/// falling back to a single-worker run).
///
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Column {table}.{column} cannot accept `{proposed}`, already typed `{existing}`")]
    CoercionConflict { table: String, column: String, existing: String, proposed: String },

    #[error("Normalize job {job_id} for load package {load_id} failed: {cause}")]
    NormalizeJobFailed { load_id: String, job_id: String, cause: String, partial_metrics: Vec<WriterMetrics> },

    #[error("No writer format satisfies destination capabilities for table {table} (item format {item_format})")]
    UnsupportedFormat { table: String, item_format: String },

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Unable to build worker pool: {0}")]
    PoolInitFailed(String),

    #[error("Cancelled by signal before commit")]
    Signalled,

    #[error("Could not parse file name {filename}: expected <table>.<job_id>.<format>")]
    InvalidFileName { filename: String },

    #[error("Unable to create directory {path}")]
    CannotCreateDir { path: String, source: std::io::Error },

    #[error("Unable to rename {from} to {to}")]
    CannotRename { from: String, to: String, source: std::io::Error },

    #[error("Unable to read/write item file {path}")]
    ItemIo { path: String, source: std::io::Error },

    #[error("Unable to (de)serialize schema JSON at {path}")]
    SchemaJson { path: String, source: serde_json::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NormalizeError {
    ///
    /// `true` if this is the one recoverable error kind the ParallelMapper and
    /// Spooler know how to retry past.
    ///
    pub fn is_coercion_conflict(&self) -> bool {
        matches!(self, NormalizeError::CoercionConflict { .. })
    }

    pub fn as_job_failed(&self) -> Option<(&str, &str, &[WriterMetrics])> {
        match self {
            NormalizeError::NormalizeJobFailed { load_id, job_id, partial_metrics, .. } =>
                Some((load_id, job_id, partial_metrics)),
            _ => None,
        }
    }
}
