// Watermark tracking for incremental exports

pub mod manager;
pub mod watermark;

pub use manager::StateManager;
pub use watermark::{ExportStatus, Watermark};
