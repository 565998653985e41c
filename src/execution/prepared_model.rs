//! Per-model execution façade.
//!
//! One `PreparedModel` exists per loaded network. All of them share one
//! worker; this type only validates, binds and submits.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::dump::TensorDumper;
use super::error::{ExecutionError, ExecutionStatus};
use super::notifier::{Completion, ExecutionContext, ExecutionResult, MeasureTiming, ResponseRx};
use crate::binding::TensorBinder;
use crate::memory::{MemoryPool, MemoryPoolSet, MemoryRegion};
use crate::model::{DataLocation, Model, Request, RequestArgument, TensorInfo};
use crate::runtime::{NetworkHandle, NetworkId};
use crate::scheduler::{WorkItem, Worker};
use crate::telemetry;

/// Per-model diagnostics options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedModelOptions {
    /// Write every request's tensors here when set.
    pub dump_dir: Option<PathBuf>,
    /// Enable runtime-side profiling for this network.
    pub profiling_enabled: bool,
}

/// A loaded network ready to execute requests.
pub struct PreparedModel {
    network: Arc<NetworkHandle>,
    model: Model,
    worker: Arc<Worker>,
    request_count: AtomicU32,
    in_flight: Arc<AtomicUsize>,
    options: PreparedModelOptions,
}

impl std::fmt::Debug for PreparedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedModel")
            .field("network_id", &self.network.id())
            .field("inputs", &self.model.inputs.len())
            .field("outputs", &self.model.outputs.len())
            .field("request_count", &self.request_count())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl PreparedModel {
    pub fn new(
        network: NetworkHandle,
        model: Model,
        worker: Arc<Worker>,
        options: PreparedModelOptions,
    ) -> Self {
        if options.profiling_enabled {
            network.runtime().set_profiling(network.id(), true);
        }
        Self {
            network: Arc::new(network),
            model,
            worker,
            request_count: AtomicU32::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            options,
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network.id()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn options(&self) -> &PreparedModelOptions {
        &self.options
    }

    /// Client requests that passed validation and were handed to the
    /// worker, including ones it refused after shutdown. Warm-up runs are
    /// not counted. Diagnostics only.
    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Requests whose memory pools have not been released yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Execute without timing measurement.
    pub fn execute(&self, request: &Request, completion: Completion) -> ExecutionStatus {
        self.submit(request, MeasureTiming::No, completion, "PreparedModel::execute", true)
    }

    /// Validate, bind and queue a request.
    ///
    /// Returns `Success` once the request is queued; the completion then
    /// fires on the worker thread. On validation failure the error status
    /// is returned and the completion fires immediately on this thread.
    pub fn execute_async(
        &self,
        request: &Request,
        measure: MeasureTiming,
        completion: Completion,
    ) -> ExecutionStatus {
        self.submit(request, measure, completion, "PreparedModel::execute_async", true)
    }

    /// Execute and block until the worker has run the request.
    pub fn execute_sync(&self, request: &Request, measure: MeasureTiming) -> ExecutionResult {
        let (completion, signal) = Completion::signal();
        self.submit(request, measure, completion, "PreparedModel::execute_sync", true);
        signal.wait().unwrap_or_else(|| {
            tracing::warn!(network_id = %self.network.id(), "request dropped before execution");
            ExecutionResult::failure(ExecutionStatus::GeneralFailure)
        })
    }

    /// Queue a request and return a receiver for its result.
    pub fn execute_awaitable(&self, request: &Request, measure: MeasureTiming) -> ResponseRx {
        let (completion, rx) = Completion::channel();
        self.submit(request, measure, completion, "PreparedModel::execute_awaitable", true);
        rx
    }

    /// Run one execution over zero-filled tensors. Returns true on success.
    pub fn execute_with_dummy_inputs(&self) -> bool {
        let request = match dummy_request(&self.model) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(network_id = %self.network.id(), error = %e, "cannot build dummy inputs");
                return false;
            }
        };

        let (completion, signal) = Completion::signal();
        let origin = "PreparedModel::execute_with_dummy_inputs";
        self.submit(&request, MeasureTiming::No, completion, origin, false);

        match signal.wait() {
            Some(result) if result.status.is_success() => true,
            Some(result) => {
                tracing::error!(
                    network_id = %self.network.id(),
                    status = %result.status,
                    "dummy execution failed"
                );
                false
            }
            None => {
                tracing::error!(network_id = %self.network.id(), "dummy execution dropped");
                false
            }
        }
    }

    fn submit(
        &self,
        request: &Request,
        measure: MeasureTiming,
        completion: Completion,
        origin: &'static str,
        counted: bool,
    ) -> ExecutionStatus {
        let context = ExecutionContext::new(measure);

        let (pools, bindings) = match self.prepare(request) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(network_id = %self.network.id(), error = %e, "request rejected");
                telemetry::record_validation_rejection(self.network.id(), e.status());
                let status = e.status();
                completion.notify(ExecutionResult::from_error(&e), origin);
                return status;
            }
        };

        let pools = self.track_release(pools);
        let mut item = WorkItem::new(Arc::clone(&self.network), Arc::new(pools), bindings, context, completion)
            .with_origin(origin);
        if counted {
            let number = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(dir) = &self.options.dump_dir {
                item = item.with_dumper(TensorDumper::new(dir, self.network.id(), number));
            }
        }

        match self.worker.submit(item) {
            Ok(request_id) => {
                tracing::debug!(network_id = %self.network.id(), request_id, "request queued");
                ExecutionStatus::Success
            }
            Err(e) => e.status(),
        }
    }

    /// Count the request as in flight until its pool set is dropped, which
    /// happens after its completion has fired or when it is refused.
    fn track_release(&self, pools: MemoryPoolSet) -> MemoryPoolSet {
        let network_id = self.network.id();
        let in_flight = Arc::clone(&self.in_flight);
        let depth = in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        telemetry::record_in_flight(network_id, depth);
        pools.with_release_hook(Box::new(move || {
            let depth = in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
            telemetry::record_in_flight(network_id, depth);
            tracing::trace!(network_id = %network_id, in_flight = depth, "request pools released");
        }))
    }

    fn prepare(&self, request: &Request) -> Result<(MemoryPoolSet, crate::binding::BindingSet), ExecutionError> {
        let pools = MemoryPoolSet::map(&request.pools)?;
        let bindings = TensorBinder::new(&self.model).bind(request, &pools)?;
        Ok((pools, bindings))
    }
}

/// Build a request over one zero-filled pool per tensor.
fn dummy_request(model: &Model) -> Result<Request, ExecutionError> {
    let mut pools = Vec::with_capacity(model.inputs.len() + model.outputs.len());
    let mut arg_for = |kind: &str, index: usize, info: &TensorInfo| {
        let size = info.num_bytes().ok_or_else(|| {
            ExecutionError::InvalidArgument(format!("{kind} {index} has unknown dimensions"))
        })?;
        let pool_index = pools.len();
        pools.push(MemoryRegion::Shared(MemoryPool::shared(size)));
        Ok::<_, ExecutionError>(RequestArgument::new(DataLocation::new(pool_index, 0, size)))
    };

    let inputs = model
        .inputs
        .iter()
        .enumerate()
        .map(|(i, info)| arg_for("input", i, info))
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = model
        .outputs
        .iter()
        .enumerate()
        .map(|(i, info)| arg_for("output", i, info))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Request { inputs, outputs, pools })
}

#[cfg(test)]
#[path = "prepared_model_tests.rs"]
mod tests;
