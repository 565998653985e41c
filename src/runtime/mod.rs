//! Inference runtime seam.
//!
//! The dispatch core never compiles or inspects a network; it only knows
//! the opaque `NetworkId` handed out by the runtime that loaded it and the
//! `InferenceRuntime` trait used to run it.

mod reference;

use std::sync::Arc;
use thiserror::Error;

use crate::binding::{InputTensor, OutputTensor};

pub use reference::{ReferenceNetwork, ReferenceRuntime};

/// Opaque id of a network loaded into a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub u32);

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Unknown network: {0}")]
    UnknownNetwork(NetworkId),

    #[error("Tensor mismatch: {0}")]
    TensorMismatch(String),

    #[error("Workload failed: {0}")]
    Workload(String),
}

/// A runtime capable of executing loaded networks.
///
/// Implementations are not assumed safe for concurrent `enqueue_workload`
/// calls; the worker guarantees at most one call at a time.
pub trait InferenceRuntime: Send + Sync {
    /// Run one inference over the bound tensors.
    fn enqueue_workload(
        &self,
        network: NetworkId,
        inputs: &[InputTensor<'_>],
        outputs: &mut [OutputTensor<'_>],
    ) -> Result<(), RuntimeError>;

    /// Release a network. Called once, when its last handle drops.
    fn unload_network(&self, network: NetworkId) -> Result<(), RuntimeError>;

    /// Toggle runtime-side profiling for a network.
    fn set_profiling(&self, _network: NetworkId, _enabled: bool) {}
}

/// Owning handle to a loaded network.
///
/// Every queued work item holds a clone of the prepared model's handle, so
/// the network is unloaded only after its last in-flight request is done.
pub struct NetworkHandle {
    id: NetworkId,
    runtime: Arc<dyn InferenceRuntime>,
}

impl NetworkHandle {
    pub fn new(id: NetworkId, runtime: Arc<dyn InferenceRuntime>) -> Self {
        Self { id, runtime }
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn runtime(&self) -> &dyn InferenceRuntime {
        self.runtime.as_ref()
    }
}

impl std::fmt::Debug for NetworkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkHandle").field("id", &self.id).finish()
    }
}

impl Drop for NetworkHandle {
    fn drop(&mut self) {
        if let Err(e) = self.runtime.unload_network(self.id) {
            tracing::warn!(network_id = %self.id, error = %e, "failed to unload network");
        } else {
            tracing::debug!(network_id = %self.id, "network unloaded");
        }
    }
}
