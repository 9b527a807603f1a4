/// Isolation forest core modules
pub mod feature;
pub mod model;
pub mod threshold;
pub mod tree;

// Re-export commonly used items
pub use feature::{ingest, ingest_with, Dataset, Ingested, MissingValues};
pub use model::IsolationForest;
pub use threshold::{classify, normalize, AnomalyScore, Threshold};
pub use tree::{average_path_length, IsolationTree, Node};
