//! Request scheduling for the dispatch core.
//!
//! One worker thread, shared by every prepared model, runs all requests
//! against the inference runtime in strict submission order.

mod message;
mod worker;

pub use message::{WorkItem, WorkerMessage};
pub use worker::{Worker, WorkerConfig, WorkerState};
