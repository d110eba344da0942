// Library exports for the batch image annotation service

// Core modules
pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{
        BatchError, CatalogError, ConfigError, GenerateError, ProcessError, ScanError, WriterError,
    },
    types::{BatchSnapshot, BatchStatus, DescribeOutput, Description, ModelInfo},
};

pub use crate::orchestration::batch_orchestrator::BatchOrchestrator;

pub use crate::services::{scan_directory, MetadataWriter, OllamaClient};

pub use crate::utils::Metrics;
