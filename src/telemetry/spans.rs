//! Span utilities for request tracing.

use tracing::{info_span, Span};

use crate::execution::ExecutionStatus;
use crate::runtime::NetworkId;

/// Extension trait for recording outcomes into a span.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    /// Record the terminal status of an execution.
    fn record_status(&self, status: ExecutionStatus);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_status(&self, status: ExecutionStatus) {
        self.record("status", status.to_string().as_str());
    }
}

/// Factory for request spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Span covering one execution on the worker thread.
    ///
    /// `status` and `error.message` are filled in through `SpanExt`.
    pub fn new(request_id: u64, network_id: NetworkId) -> Span {
        info_span!(
            "execution_request",
            request_id,
            network_id = %network_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty
        )
    }
}
