pub mod metadata;
pub mod ollama;
pub mod scanner;

// Re-export commonly used services
pub use metadata::MetadataWriter;
pub use ollama::OllamaClient;
pub use scanner::{is_image_path, scan_directory, IMAGE_EXTENSIONS};
