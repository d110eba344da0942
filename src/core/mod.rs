pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    BatchError, CatalogError, ConfigError, GenerateError, ProcessError, ScanError, WriterError,
};
pub use types::{
    BatchSnapshot, BatchStatus, DescribeOutput, Description, ModelInfo, MAX_DESCRIPTION_LEN,
};
