// Execution Engine Module
// Parallel dispatch, run orchestration, and progress events

pub mod dispatcher;
pub mod events;
pub mod orchestrator;

// Re-export key types
pub use dispatcher::Dispatcher;
pub use events::{progress_channel, EventSender, LogLevel, PipelineEvent, ProgressReceiver, ProgressSender};
pub use orchestrator::{PipelineRun, PipelineState, RunReport, StageReport};
