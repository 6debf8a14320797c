// Execution Events
// Progress reporting for pipeline runs

use crate::stage::{OutputStatus, StageKind};

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for pipeline progress events
pub type ProgressSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver for pipeline progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while a pipeline runs
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Families were discovered and the run is starting
    PipelineStarted {
        stages: Vec<StageKind>,
        discovered: usize,
        selected: usize,
    },

    /// Every discovered family passed validation
    ValidationCompleted { families: usize, duration: Duration },

    /// A stage is about to dispatch its families
    StageStarted {
        stage: StageKind,
        output_dir: PathBuf,
        families: usize,
    },

    /// One family finished a stage
    FamilyCompleted {
        stage: StageKind,
        family: String,
        status: OutputStatus,
        duration: Duration,
    },

    /// One family failed a stage
    FamilyFailed {
        stage: StageKind,
        family: String,
        message: String,
    },

    /// A stage finished for all families
    StageCompleted {
        stage: StageKind,
        computed: usize,
        cached: usize,
        duration: Duration,
    },

    /// The run finished
    PipelineCompleted { success: bool, duration: Duration },

    /// Free-form message
    Log {
        level: LogLevel,
        message: String,
        stage: Option<StageKind>,
        family: Option<String>,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warning,
    Error,
}

impl PipelineEvent {
    pub fn family_completed(
        stage: StageKind,
        family: impl Into<String>,
        status: OutputStatus,
        duration: Duration,
    ) -> Self {
        Self::FamilyCompleted {
            stage,
            family: family.into(),
            status,
            duration,
        }
    }

    pub fn family_failed(
        stage: StageKind,
        family: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::FamilyFailed {
            stage,
            family: family.into(),
            message: message.into(),
        }
    }

    /// Create a warning log event
    pub fn warning(
        message: impl Into<String>,
        stage: Option<StageKind>,
        family: Option<String>,
    ) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
            stage,
            family,
        }
    }

    /// Create an error log event
    pub fn error(message: impl Into<String>, stage: Option<StageKind>, family: Option<String>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            message: message.into(),
            stage,
            family,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: PipelineEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: PipelineEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: PipelineEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(PipelineEvent::family_completed(
            StageKind::Phylogeny,
            "1abc",
            OutputStatus::Cached,
            Duration::from_millis(5),
        ));
        tx.send_event(PipelineEvent::warning("no structure", Some(StageKind::Coevolution), None));

        match rx.recv().await.unwrap() {
            PipelineEvent::FamilyCompleted {
                stage,
                family,
                status,
                ..
            } => {
                assert_eq!(stage, StageKind::Phylogeny);
                assert_eq!(family, "1abc");
                assert_eq!(status, OutputStatus::Cached);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            PipelineEvent::Log {
                level: LogLevel::Warning,
                ..
            }
        ));
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(PipelineEvent::error("boom", None, None));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(PipelineEvent::PipelineCompleted {
            success: true,
            duration: Duration::ZERO,
        });
    }
}
