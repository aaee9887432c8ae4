pub mod assistant;
pub mod scan;

pub use assistant::{AssistantHandler, Conversation};
pub use scan::{ScanPipeline, ScanSession, ScanState};
