pub mod file;
pub mod http;
pub mod memory;

/// Re-export commonly used types from adapters
pub use file::FileComponent;
pub use http::HttpComponent;
pub use memory::{MemoryComponent, MemoryQueue};
