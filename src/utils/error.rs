use thiserror::Error;

/// Errors raised while turning a raw table into a numeric dataset
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    /// Selection is empty, or none of the selected columns is numeric
    #[error("IngestError: no numeric columns selected")]
    NoNumericColumns,
    /// A selected column does not exist in the table
    #[error("IngestError: unknown column '{0}'")]
    UnknownColumn(String),
    /// A selected column exists but is not numeric-typed
    #[error("IngestError: column '{0}' is not numeric")]
    NonNumericColumn(String),
    /// Every row was excluded by the missing-value policy
    #[error("IngestError: all {excluded} rows were excluded (missing or non-numeric values)")]
    EmptyAfterFiltering { excluded: usize },
    /// A row handed to `Dataset::from_rows` has the wrong width
    #[error("IngestError: row {row} has {actual} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    /// NaN or infinite value in a row handed to `Dataset::from_rows`
    #[error("IngestError: row {row} contains NaN or Inf in feature {feature}")]
    NonFiniteValue { row: usize, feature: usize },
}

/// Scoring a row whose width differs from the trained feature count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("DimensionMismatch: expected {expected} features, got {actual}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Scores or flags that do not line up with the dataset's row indices
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("IndexMismatch: {0}")]
pub struct IndexMismatch(pub String);

/// Errors raised by training, scoring and classification
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// Configuration violation (ensemble size, sub-sample size, sensitivity)
    #[error("DetectionError: invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("DetectionError: need at least 2 rows to train, got {rows}")]
    InsufficientRows { rows: usize },
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error(transparent)]
    IndexMismatch(#[from] IndexMismatch),
    /// Training was cancelled between two tree constructions
    #[error("DetectionError: training cancelled")]
    Cancelled,
    #[error("DetectionError: failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// Errors raised while loading a table from disk or memory
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("LoadError: csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("LoadError: json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("LoadError: io: {0}")]
    Io(#[from] std::io::Error),
    #[error("LoadError: unsupported table format '{0}'")]
    UnsupportedFormat(String),
    #[error("LoadError: record {index} is not a JSON object")]
    NotAnObject { index: usize },
}
