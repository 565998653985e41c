//! Queue messages and the work item carried by them.

use std::sync::Arc;

use crate::binding::BindingSet;
use crate::execution::dump::TensorDumper;
use crate::execution::{Completion, ExecutionContext};
use crate::memory::MemoryPoolSet;
use crate::runtime::NetworkHandle;

/// One queued execution: bindings, pools, measurement state and the
/// completion to fire once it has run.
pub struct WorkItem {
    pub(crate) request_id: u64,
    pub(crate) network: Arc<NetworkHandle>,
    pub(crate) pools: Arc<MemoryPoolSet>,
    pub(crate) bindings: BindingSet,
    pub(crate) context: ExecutionContext,
    pub(crate) completion: Completion,
    pub(crate) dumper: Option<TensorDumper>,
    pub(crate) origin: &'static str,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("request_id", &self.request_id)
            .field("network", &self.network.id())
            .field("inputs", &self.bindings.inputs.len())
            .field("outputs", &self.bindings.outputs.len())
            .field("measuring", &self.context.is_measuring())
            .finish()
    }
}

impl WorkItem {
    pub fn new(
        network: Arc<NetworkHandle>,
        pools: Arc<MemoryPoolSet>,
        bindings: BindingSet,
        context: ExecutionContext,
        completion: Completion,
    ) -> Self {
        Self {
            request_id: 0,
            network,
            pools,
            bindings,
            context,
            completion,
            dumper: None,
            origin: "Worker::execute",
        }
    }

    /// Dump request tensors before and after execution.
    pub fn with_dumper(mut self, dumper: TensorDumper) -> Self {
        self.dumper = Some(dumper);
        self
    }

    /// Name reported to the completion for diagnostics.
    pub fn with_origin(mut self, origin: &'static str) -> Self {
        self.origin = origin;
        self
    }

    /// Id assigned by the worker on submission; 0 before that.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

/// A message on the worker queue.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Stop the worker. Queued once, at shutdown, behind every pending request.
    Exit,
    Request(Box<WorkItem>),
}
