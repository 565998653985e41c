//! Execution error and status types.
//!
//! Every failure maps to exactly one `ExecutionStatus`, which is what the
//! transport layer reports back to the client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::notifier::OutputShape;

/// Terminal status of an execution, as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    GeneralFailure,
    InvalidArgument,
    OutputInsufficientSize,
}

impl ExecutionStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::GeneralFailure => "general_failure",
            Self::InvalidArgument => "invalid_argument",
            Self::OutputInsufficientSize => "output_insufficient_size",
        };
        f.write_str(name)
    }
}

/// Errors raised while validating, queuing or running a request.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Output {index} buffer too small: required {required} bytes, got {provided}")]
    OutputInsufficientSize {
        index: usize,
        required: usize,
        provided: usize,
        output_shapes: Vec<OutputShape>,
    },

    #[error("Memory pool mapping failed: {0}")]
    PoolMapping(String),

    #[error("Runtime execution failed: {0}")]
    Runtime(String),

    #[error("Worker is not accepting requests")]
    WorkerStopped,

    #[error("Worker thread failed to start: {0}")]
    ThreadLifecycle(#[source] std::io::Error),
}

impl ExecutionError {
    /// Status reported to the client for this error.
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::InvalidArgument(_) => ExecutionStatus::InvalidArgument,
            Self::OutputInsufficientSize { .. } => ExecutionStatus::OutputInsufficientSize,
            Self::PoolMapping(_)
            | Self::Runtime(_)
            | Self::WorkerStopped
            | Self::ThreadLifecycle(_) => ExecutionStatus::GeneralFailure,
        }
    }

    /// Output shapes to report alongside the failure, if any.
    pub fn output_shapes(&self) -> &[OutputShape] {
        match self {
            Self::OutputInsufficientSize { output_shapes, .. } => output_shapes,
            _ => &[],
        }
    }

    /// True for errors detected before the worker was involved.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::OutputInsufficientSize { .. } | Self::PoolMapping(_)
        )
    }
}
