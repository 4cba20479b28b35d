pub mod cancel;
pub mod controller;
pub mod engine;
pub mod extractor;
pub mod result;
pub mod scheduler;

// Re-export common types
pub use cancel::CancelHandle;
pub use controller::FetchController;
pub use engine::{ExportOutput, ScraperEngine};
pub use result::{ContentRecord, FetchResult, FetchStatus};
pub use scheduler::ChunkScheduler;
