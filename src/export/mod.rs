/// Result assembly and labeled-table export
pub mod builder;
pub mod writer;

// Re-export commonly used functions
pub use builder::{assemble, AssembledRow};
pub use writer::{write_labeled_csv, write_labeled_json, RowFilter};
