// Pipeline Errors
// Error taxonomy shared by validation, stage execution, and dispatch

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input data (alignment or structure)
    Input,
    /// Missing or invalid configuration reference
    Configuration,
    /// Discovered or attempted family count differs from the expected count
    CountMismatch,
    /// External tool or stage execution failed for a family
    Execution,
    /// Filesystem failure outside of a specific stage
    Io,
}

/// Errors raised by the external tree inference tool
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("executable not found: {program}")]
    NotFound { program: String },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("'{program}' produced no output")]
    EmptyOutput { program: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Main error type for pipeline runs
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed alignment for family '{family}': {message}")]
    Msa { family: String, message: String },

    #[error("malformed structure for family '{family}': {message}")]
    Structure { family: String, message: String },

    #[error("unreadable tree for family '{family}': {message}")]
    Tree { family: String, message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("failed to load configuration file {}: {source}", .path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("expected {expected} families but {actual} were {context}")]
    CountMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    #[error("stage '{stage}' failed for family '{family}': {source}")]
    Execution {
        stage: String,
        family: String,
        #[source]
        source: ToolError,
    },

    #[error("stage '{stage}' for family '{family}' is missing its input {}", .path.display())]
    MissingInput {
        stage: String,
        family: String,
        path: PathBuf,
    },

    #[error("worker for '{label}' panicked: {message}")]
    WorkerPanicked { label: String, message: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result alias used across the crate
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn msa(family: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Msa {
            family: family.into(),
            message: message.into(),
        }
    }

    pub fn structure(family: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structure {
            family: family.into(),
            message: message.into(),
        }
    }

    pub fn tree(family: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tree {
            family: family.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn count_mismatch(expected: usize, actual: usize, context: impl Into<String>) -> Self {
        Self::CountMismatch {
            expected,
            actual,
            context: context.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for callers that branch on the failure category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Msa { .. } | Self::Structure { .. } => ErrorKind::Input,
            Self::Configuration { .. } | Self::ConfigFile { .. } => ErrorKind::Configuration,
            Self::CountMismatch { .. } => ErrorKind::CountMismatch,
            Self::Execution { .. }
            | Self::Tree { .. }
            | Self::MissingInput { .. }
            | Self::WorkerPanicked { .. } => ErrorKind::Execution,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Family the error is attributed to, if any
    pub fn family(&self) -> Option<&str> {
        match self {
            Self::Msa { family, .. }
            | Self::Structure { family, .. }
            | Self::Execution { family, .. }
            | Self::Tree { family, .. }
            | Self::MissingInput { family, .. } => Some(family),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let input = PipelineError::msa("fam1", "ragged");
        let config = PipelineError::configuration("missing rate matrix");
        let count = PipelineError::count_mismatch(3, 2, "discovered");
        let exec = PipelineError::Execution {
            stage: "phylogeny".to_string(),
            family: "fam1".to_string(),
            source: ToolError::EmptyOutput {
                program: "FastTree".to_string(),
            },
        };

        assert_eq!(input.kind(), ErrorKind::Input);
        assert_eq!(config.kind(), ErrorKind::Configuration);
        assert_eq!(count.kind(), ErrorKind::CountMismatch);
        assert_eq!(exec.kind(), ErrorKind::Execution);
        assert_eq!(PipelineError::tree("fam1", "truncated").kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = PipelineError::Execution {
            stage: "phylogeny".to_string(),
            family: "1a0b".to_string(),
            source: ToolError::NonZeroExit {
                program: "FastTree".to_string(),
                code: Some(2),
                stderr: "bad matrix".to_string(),
            },
        };

        let message = err.to_string();
        assert!(message.contains("phylogeny"));
        assert!(message.contains("1a0b"));
        assert_eq!(err.family(), Some("1a0b"));

        let source = std::error::Error::source(&err).unwrap().to_string();
        assert!(source.contains("exit code 2"));
        assert!(source.contains("bad matrix"));
    }

    #[test]
    fn test_count_mismatch_message() {
        let err = PipelineError::count_mismatch(3, 2, "discovered in data/a3m");
        assert_eq!(
            err.to_string(),
            "expected 3 families but 2 were discovered in data/a3m"
        );
        assert!(err.family().is_none());
    }
}
