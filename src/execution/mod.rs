//! Execution flow for prepared models.
//!
//! `PreparedModel` validates and binds requests on the caller's thread,
//! the shared worker runs them through `executor`, and `notifier` delivers
//! the terminal result.

pub mod dump;
mod error;
pub mod executor;
mod notifier;
mod prepared_model;

pub use error::{ExecutionError, ExecutionStatus};
pub use notifier::{
    Completion, CompletionSignal, ExecutionContext, ExecutionResult, MeasureTiming, OutputShape,
    ResponseRx, Timing,
};
pub use prepared_model::{PreparedModel, PreparedModelOptions};
