//! nn-dispatch
//!
//! Serialized execution core for prepared neural-network graphs. Callers on
//! any thread submit inference requests against a prepared model; a single
//! shared worker thread runs them one at a time, in submission order, and
//! reports each outcome exactly once.
//!
//! # Layers
//!
//! - **Dispatcher** (`PreparedModel`): validates a request, binds its tensors
//!   into shared pools and queues it. Validation failures never reach the
//!   worker.
//! - **Worker**: the one thread allowed to call into the inference runtime.
//! - **Executor**: runs one work item against the runtime and builds the
//!   result (status, output shapes, timing).
//! - **Notifier**: delivers the result to a callback, a blocking signal or
//!   an awaitable channel.

pub mod binding;
pub mod config;
pub mod execution;
pub mod memory;
pub mod model;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;

use std::sync::Arc;

use config::DriverConfig;
use execution::{ExecutionError, PreparedModel, PreparedModelOptions};
use model::Model;
use runtime::{InferenceRuntime, NetworkHandle, NetworkId};
use scheduler::Worker;

/// Driver instance: one worker shared by every prepared model it creates.
pub struct Driver {
    runtime: Arc<dyn InferenceRuntime>,
    worker: Arc<Worker>,
    config: DriverConfig,
}

impl Driver {
    /// Start the worker thread and bind the driver to `runtime`.
    pub fn new(runtime: Arc<dyn InferenceRuntime>, config: DriverConfig) -> Result<Self, ExecutionError> {
        let worker = Worker::spawn(&config.worker)?;
        Ok(Self { runtime, worker, config })
    }

    /// Wrap a network already loaded into the runtime.
    ///
    /// The returned model owns the network and unloads it on drop, after
    /// every request referencing it has finished.
    pub fn prepare_model(&self, network: NetworkId, model: Model) -> PreparedModel {
        self.prepare_model_with_options(network, model, self.config.model_options())
    }

    pub fn prepare_model_with_options(
        &self,
        network: NetworkId,
        model: Model,
        options: PreparedModelOptions,
    ) -> PreparedModel {
        let handle = NetworkHandle::new(network, Arc::clone(&self.runtime));
        tracing::debug!(network_id = %network, "prepared model created");
        PreparedModel::new(handle, model, Arc::clone(&self.worker), options)
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Stop the shared worker. Requests already queued still run; later
    /// submissions fail with `GeneralFailure`.
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver").field("worker", &self.worker).finish()
    }
}
