//! Completion delivery.
//!
//! A `Completion` is consumed by `notify`, so a request can be reported at
//! most once. Blocking callers pair a completion with a `CompletionSignal`;
//! async callers can take a oneshot receiver instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use super::error::{ExecutionError, ExecutionStatus};

/// Receiver half for awaiting an execution result.
pub type ResponseRx = tokio::sync::oneshot::Receiver<ExecutionResult>;

/// Whether the caller asked for timing measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureTiming {
    #[default]
    No,
    Yes,
}

impl From<bool> for MeasureTiming {
    fn from(measure: bool) -> Self {
        if measure { Self::Yes } else { Self::No }
    }
}

/// Shape of one output as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputShape {
    pub dimensions: Vec<u32>,
    /// False when the supplied buffer cannot hold this shape.
    pub is_sufficient: bool,
}

/// Timing of one execution. `None` means unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Duration of the runtime call alone.
    pub time_on_device: Option<Duration>,
    /// From dispatch entry to the end of execution.
    pub time_in_driver: Option<Duration>,
}

impl Timing {
    pub const UNAVAILABLE: Timing = Timing { time_on_device: None, time_in_driver: None };

    pub fn is_available(&self) -> bool {
        self.time_on_device.is_some() || self.time_in_driver.is_some()
    }
}

/// Measurement state captured when a request is dispatched.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    pub measure: MeasureTiming,
    pub driver_start: Option<Instant>,
}

impl ExecutionContext {
    pub fn new(measure: MeasureTiming) -> Self {
        let driver_start = (measure == MeasureTiming::Yes).then(Instant::now);
        Self { measure, driver_start }
    }

    pub fn is_measuring(&self) -> bool {
        self.measure == MeasureTiming::Yes
    }

    /// Build timing for an execution that spent `device` in the runtime.
    pub fn timing(&self, device: Option<Duration>) -> Timing {
        if !self.is_measuring() {
            return Timing::UNAVAILABLE;
        }
        Timing {
            time_on_device: device,
            time_in_driver: self.driver_start.map(|start| start.elapsed()),
        }
    }
}

/// Terminal result of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub output_shapes: Vec<OutputShape>,
    pub timing: Timing,
}

impl ExecutionResult {
    pub fn failure(status: ExecutionStatus) -> Self {
        Self { status, output_shapes: Vec::new(), timing: Timing::UNAVAILABLE }
    }

    pub fn from_error(error: &ExecutionError) -> Self {
        Self {
            status: error.status(),
            output_shapes: error.output_shapes().to_vec(),
            timing: Timing::UNAVAILABLE,
        }
    }
}

type Handler = Box<dyn FnOnce(ExecutionResult, &'static str) + Send + 'static>;

/// Caller-supplied completion handler for one request.
pub struct Completion {
    handler: Handler,
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl Completion {
    /// Handler receiving the result and the name of the reporting function.
    pub fn new(handler: impl FnOnce(ExecutionResult, &'static str) + Send + 'static) -> Self {
        Self { handler: Box::new(handler) }
    }

    /// Handler that ignores the diagnostic origin.
    pub fn from_fn(handler: impl FnOnce(ExecutionResult) + Send + 'static) -> Self {
        Self::new(move |result, _| handler(result))
    }

    /// Completion that wakes a blocked caller.
    pub fn signal() -> (Self, CompletionSignal) {
        let slot = Arc::new(SignalSlot::default());
        let sender = SignalSender { slot: Arc::clone(&slot) };
        let completion = Self::new(move |result, _| sender.send(result));
        (completion, CompletionSignal { slot })
    }

    /// Completion delivered through a oneshot channel.
    pub fn channel() -> (Self, ResponseRx) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let completion = Self::new(move |result, _| {
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    /// Deliver the terminal result.
    pub fn notify(self, result: ExecutionResult, origin: &'static str) {
        tracing::trace!(status = %result.status, origin, "notifying completion");
        (self.handler)(result, origin);
    }
}

enum SignalState {
    Pending,
    Done(ExecutionResult),
    Abandoned,
}

struct SignalSlot {
    state: Mutex<SignalState>,
    ready: Condvar,
}

impl Default for SignalSlot {
    fn default() -> Self {
        Self { state: Mutex::new(SignalState::Pending), ready: Condvar::new() }
    }
}

struct SignalSender {
    slot: Arc<SignalSlot>,
}

impl SignalSender {
    fn send(self, result: ExecutionResult) {
        *self.slot.state.lock() = SignalState::Done(result);
        self.slot.ready.notify_all();
    }
}

impl Drop for SignalSender {
    fn drop(&mut self) {
        let mut state = self.slot.state.lock();
        if matches!(*state, SignalState::Pending) {
            *state = SignalState::Abandoned;
            self.slot.ready.notify_all();
        }
    }
}

/// One-shot signal satisfied by the paired `Completion`.
pub struct CompletionSignal {
    slot: Arc<SignalSlot>,
}

impl CompletionSignal {
    /// Block until the completion fires.
    ///
    /// Returns `None` if the completion was dropped without being notified.
    pub fn wait(self) -> Option<ExecutionResult> {
        let mut state = self.slot.state.lock();
        while matches!(*state, SignalState::Pending) {
            self.slot.ready.wait(&mut state);
        }
        match std::mem::replace(&mut *state, SignalState::Abandoned) {
            SignalState::Done(result) => Some(result),
            _ => None,
        }
    }

    /// Like `wait`, giving up after `timeout`. Returns `Err(self)` on timeout.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Option<ExecutionResult>, Self> {
        let deadline = Instant::now() + timeout;
        {
            let mut state = self.slot.state.lock();
            while matches!(*state, SignalState::Pending) {
                if self.slot.ready.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            if matches!(*state, SignalState::Pending) {
                drop(state);
                return Err(self);
            }
        }
        Ok(self.wait())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ok() -> ExecutionResult {
        ExecutionResult {
            status: ExecutionStatus::Success,
            output_shapes: vec![OutputShape { dimensions: vec![1], is_sufficient: true }],
            timing: Timing::UNAVAILABLE,
        }
    }

    #[test]
    fn signal_delivers_across_threads() {
        let (completion, signal) = Completion::signal();
        let handle = thread::spawn(move || completion.notify(ok(), "test"));
        let result = signal.wait().unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        handle.join().unwrap();
    }

    #[test]
    fn dropped_completion_abandons_signal() {
        let (completion, signal) = Completion::signal();
        drop(completion);
        assert!(signal.wait().is_none());
    }

    #[test]
    fn wait_timeout_returns_signal_when_pending() {
        let (completion, signal) = Completion::signal();
        let signal = signal.wait_timeout(Duration::from_millis(10)).unwrap_err();
        completion.notify(ok(), "test");
        assert!(signal.wait().is_some());
    }

    #[test]
    fn handler_sees_origin() {
        let (tx, rx) = std::sync::mpsc::channel();
        let completion = Completion::new(move |_, origin| tx.send(origin).unwrap());
        completion.notify(ok(), "PreparedModel::execute_graph");
        assert_eq!(rx.recv().unwrap(), "PreparedModel::execute_graph");
    }

    #[test]
    fn timing_unavailable_without_measurement() {
        let ctx = ExecutionContext::new(MeasureTiming::No);
        assert!(ctx.driver_start.is_none());
        assert_eq!(ctx.timing(Some(Duration::from_millis(1))), Timing::UNAVAILABLE);
    }

    #[test]
    fn timing_spans_driver_when_measuring() {
        let ctx = ExecutionContext::new(MeasureTiming::Yes);
        thread::sleep(Duration::from_millis(2));
        let timing = ctx.timing(Some(Duration::from_micros(500)));
        assert_eq!(timing.time_on_device, Some(Duration::from_micros(500)));
        assert!(timing.time_in_driver.unwrap() >= Duration::from_millis(2));
    }

    #[tokio::test]
    async fn channel_completion_resolves_receiver() {
        let (completion, rx) = Completion::channel();
        completion.notify(ok(), "test");
        assert_eq!(rx.await.unwrap(), ok());
    }
}
