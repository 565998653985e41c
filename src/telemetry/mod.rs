//! Telemetry for the dispatch core.
//!
//! Structured logging, per-request spans and metric recorders. Metrics go
//! through the `metrics` facade; installing an exporter is the host's job.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_execution_failure, record_execution_success, record_in_flight, record_queue_depth,
    record_validation_rejection,
};
pub use spans::{RequestSpan, SpanExt};
