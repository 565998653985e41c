//! Single worker loop: dequeue requests and execute them.
//!
//! All execution for every prepared model goes through this worker, so the
//! inference runtime never sees two concurrent calls. Callers enqueue and
//! return; the worker runs each request and fires its completion before
//! taking the next message.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::message::{WorkItem, WorkerMessage};
use crate::execution::{executor, ExecutionError, ExecutionResult, ExecutionStatus};
use crate::telemetry::{self, RequestSpan, SpanExt};

/// Configuration for the worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub thread_name: String,
    /// Thread stack size in bytes (0 = platform default).
    pub stack_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { thread_name: "nn-dispatch-worker".to_string(), stack_size: 0 }
    }
}

/// Worker lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    Draining = 2,
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Terminated,
        }
    }
}

struct Queue {
    messages: VecDeque<WorkerMessage>,
    /// Cleared when `Exit` has been queued.
    accepting: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    state: AtomicU8,
    processed: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: WorkerState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }
}

/// The execution worker shared by all prepared models.
pub struct Worker {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("processed", &self.processed())
            .finish()
    }
}

impl Worker {
    /// Start the worker thread.
    pub fn spawn(config: &WorkerConfig) -> Result<Arc<Self>, ExecutionError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue { messages: VecDeque::new(), accepting: true }),
            available: Condvar::new(),
            state: AtomicU8::new(WorkerState::Created as u8),
            processed: AtomicU64::new(0),
        });

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if config.stack_size > 0 {
            builder = builder.stack_size(config.stack_size);
        }
        let thread_shared = Arc::clone(&shared);
        let handle = builder
            .spawn(move || worker_loop(&thread_shared))
            .map_err(ExecutionError::ThreadLifecycle)?;

        tracing::info!(thread = %config.thread_name, "worker started");
        Ok(Arc::new(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            next_id: AtomicU64::new(1),
        }))
    }

    /// Queue a work item. Returns the request id assigned to it.
    ///
    /// Once shutdown has been requested the item is refused: its completion
    /// is fired on the calling thread with `GeneralFailure`.
    pub fn submit(&self, mut item: WorkItem) -> Result<u64, ExecutionError> {
        let mut queue = self.shared.queue.lock();
        if !queue.accepting {
            drop(queue);
            tracing::warn!(network_id = %item.network.id(), "submit after worker shutdown");
            let WorkItem { completion, origin, .. } = item;
            completion.notify(ExecutionResult::failure(ExecutionStatus::GeneralFailure), origin);
            return Err(ExecutionError::WorkerStopped);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        item.request_id = id;
        queue.messages.push_back(WorkerMessage::Request(Box::new(item)));
        let depth = queue.messages.len();
        drop(queue);

        self.shared.available.notify_one();
        telemetry::record_queue_depth(depth);
        Ok(id)
    }

    /// Append `Exit` to the queue and wait for the worker thread to finish.
    ///
    /// Every request queued before this call still runs and is notified.
    /// Submissions made after it are refused. Calling this again, or from
    /// the worker thread itself, returns without joining.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.accepting {
                queue.accepting = false;
                queue.messages.push_back(WorkerMessage::Exit);
                self.shared.available.notify_one();
            }
        }

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            tracing::debug!("worker shutdown requested from worker thread; not joining");
            return;
        }
        if handle.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// True until shutdown has been requested.
    pub fn is_accepting(&self) -> bool {
        self.shared.queue.lock().accepting
    }

    /// Number of queued requests not yet dequeued.
    pub fn pending(&self) -> usize {
        self.shared
            .queue
            .lock()
            .messages
            .iter()
            .filter(|m| matches!(m, WorkerMessage::Request(_)))
            .count()
    }

    /// Number of requests executed and notified so far.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Acquire)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    shared.set_state(WorkerState::Running);

    loop {
        let message = {
            let mut queue = shared.queue.lock();
            while queue.messages.is_empty() {
                shared.available.wait(&mut queue);
            }
            queue.messages.pop_front()
        };

        match message {
            Some(WorkerMessage::Request(item)) => process(shared, *item),
            Some(WorkerMessage::Exit) | None => break,
        }
    }

    shared.set_state(WorkerState::Draining);
    // `Exit` is the last message ever queued, so nothing is left behind it.
    debug_assert!(shared.queue.lock().messages.is_empty());

    shared.set_state(WorkerState::Terminated);
    tracing::info!("worker stopped");
}

fn process(shared: &Shared, item: WorkItem) {
    let network_id = item.network.id();
    let span = RequestSpan::new(item.request_id, network_id);
    let _enter = span.enter();

    let result = match panic::catch_unwind(AssertUnwindSafe(|| executor::execute_work_item(&item))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(panic = %message, "execution panicked");
            ExecutionResult::failure(ExecutionStatus::GeneralFailure)
        }
    };

    span.record_status(result.status);
    if result.status.is_success() {
        telemetry::record_execution_success(network_id, &result.timing);
    } else {
        telemetry::record_execution_failure(network_id, result.status);
    }

    let WorkItem { completion, origin, .. } = item;
    let notified = panic::catch_unwind(AssertUnwindSafe(move || completion.notify(result, origin)));
    if notified.is_err() {
        tracing::error!("completion callback panicked");
    }
    shared.processed.fetch_add(1, Ordering::AcqRel);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
