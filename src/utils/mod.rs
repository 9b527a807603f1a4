/// Utility modules for error handling and cooperative cancellation
pub mod cancellation;
pub mod error;

// Re-export commonly used types
pub use cancellation::CancellationToken;
pub use error::{DetectionError, DimensionMismatch, IndexMismatch, IngestError, LoadError};
