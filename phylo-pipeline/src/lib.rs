// Phylo Pipeline Library
// Cached, parallel per-family tree inference and count matrices

pub mod alignment;
pub mod cache;
pub mod config;
pub mod error;
pub mod execution;
pub mod family;
pub mod newick;
pub mod runners;
pub mod stage;
pub mod structure;
pub mod validate;

// Re-export commonly used types
pub use error::{ErrorKind, PipelineError, PipelineResult, ToolError};

pub use config::{PipelineConfig, RateMatrix, ToolConfig};

pub use family::{discover_families, Family};

// Re-export execution types
pub use execution::{
    progress_channel, Dispatcher, EventSender, LogLevel, PipelineEvent, PipelineRun,
    PipelineState, ProgressReceiver, ProgressSender, RunReport, StageReport,
};

// Re-export stage types
pub use stage::{
    CoevolutionKernel, ContactPairCounts, OutputStatus, PairMatrix, StageKind, StageOutcome,
    StageRunner,
};

pub use cache::StageCache;
pub use runners::{FastTree, TreeBuilder};
pub use validate::FamilySummary;
