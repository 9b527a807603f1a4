//! Fast Anomaly Engine - unsupervised outlier detection for tabular data
//!
//! This library loads column-named tables, selects numeric features, and
//! flags anomalous rows with an isolation forest whose decision threshold is
//! driven by a single sensitivity setting.

pub mod dataset;
pub mod engine;
pub mod export;
pub mod insight_core;
pub mod stats;
pub mod utils;

pub use dataset::{Cell, ColumnType, Record, Table};
pub use engine::{detect, AnomalyEngine, Detection, DetectionConfig};
pub use export::{assemble, AssembledRow, RowFilter};
pub use insight_core::{ingest, ingest_with, AnomalyScore, Dataset, Ingested, IsolationForest, MissingValues};
pub use stats::Statistics;
pub use utils::{CancellationToken, DetectionError, DimensionMismatch, IndexMismatch, IngestError, LoadError};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
