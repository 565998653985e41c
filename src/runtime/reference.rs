//! Reference CPU runtime.
//!
//! Runs two trivial network kinds directly on the bound buffers. Used by
//! the CLI self-test and the benches, and handy as a stand-in runtime.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{InferenceRuntime, NetworkId, RuntimeError};
use crate::binding::{InputTensor, OutputTensor};
use crate::model::OperandType;

/// Network kinds understood by the reference runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceNetwork {
    /// Output `i` is a byte copy of input `i`.
    Identity,
    /// Output 0 is the elementwise sum of all float32 inputs.
    AddFloat32,
}

pub struct ReferenceRuntime {
    networks: RwLock<HashMap<NetworkId, ReferenceNetwork>>,
    profiled: RwLock<HashSet<NetworkId>>,
    next_id: AtomicU32,
    workloads: AtomicU64,
}

impl ReferenceRuntime {
    pub fn new() -> Self {
        Self {
            networks: RwLock::new(HashMap::new()),
            profiled: RwLock::new(HashSet::new()),
            next_id: AtomicU32::new(1),
            workloads: AtomicU64::new(0),
        }
    }

    /// Load a network and return its id.
    pub fn load_network(&self, kind: ReferenceNetwork) -> NetworkId {
        let id = NetworkId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.networks.write().insert(id, kind);
        id
    }

    pub fn is_loaded(&self, network: NetworkId) -> bool {
        self.networks.read().contains_key(&network)
    }

    pub fn is_profiling(&self, network: NetworkId) -> bool {
        self.profiled.read().contains(&network)
    }

    /// Total workloads executed across all networks.
    pub fn workloads(&self) -> u64 {
        self.workloads.load(Ordering::Relaxed)
    }
}

impl Default for ReferenceRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceRuntime for ReferenceRuntime {
    fn enqueue_workload(
        &self,
        network: NetworkId,
        inputs: &[InputTensor<'_>],
        outputs: &mut [OutputTensor<'_>],
    ) -> Result<(), RuntimeError> {
        let kind = self
            .networks
            .read()
            .get(&network)
            .copied()
            .ok_or(RuntimeError::UnknownNetwork(network))?;
        self.workloads.fetch_add(1, Ordering::Relaxed);

        match kind {
            ReferenceNetwork::Identity => run_identity(inputs, outputs),
            ReferenceNetwork::AddFloat32 => run_add_f32(inputs, outputs),
        }
    }

    fn unload_network(&self, network: NetworkId) -> Result<(), RuntimeError> {
        self.profiled.write().remove(&network);
        self.networks
            .write()
            .remove(&network)
            .map(|_| ())
            .ok_or(RuntimeError::UnknownNetwork(network))
    }

    fn set_profiling(&self, network: NetworkId, enabled: bool) {
        let mut profiled = self.profiled.write();
        if enabled {
            profiled.insert(network);
        } else {
            profiled.remove(&network);
        }
    }
}

fn run_identity(
    inputs: &[InputTensor<'_>],
    outputs: &mut [OutputTensor<'_>],
) -> Result<(), RuntimeError> {
    if inputs.len() != outputs.len() {
        return Err(RuntimeError::TensorMismatch(format!(
            "identity needs matching counts, got {} inputs and {} outputs",
            inputs.len(),
            outputs.len()
        )));
    }
    for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
        let src = input.as_bytes();
        if output.len() < src.len() {
            return Err(RuntimeError::TensorMismatch(format!(
                "output {} holds {} bytes, input needs {}",
                output.index(),
                output.len(),
                src.len()
            )));
        }
        output.as_bytes_mut()[..src.len()].copy_from_slice(src);
        output.set_shape(input.info().dimensions.clone());
    }
    Ok(())
}

fn run_add_f32(
    inputs: &[InputTensor<'_>],
    outputs: &mut [OutputTensor<'_>],
) -> Result<(), RuntimeError> {
    let [output] = outputs else {
        return Err(RuntimeError::TensorMismatch("add expects exactly one output".into()));
    };
    let Some(first) = inputs.first() else {
        return Err(RuntimeError::TensorMismatch("add expects at least one input".into()));
    };
    if inputs.iter().any(|t| t.info().data_type != OperandType::Float32) {
        return Err(RuntimeError::TensorMismatch("add supports float32 only".into()));
    }

    let elements = first.as_bytes().len() / 4;
    let mut sum = vec![0f32; elements];
    for input in inputs {
        let bytes = input.as_bytes();
        if bytes.len() / 4 != elements {
            return Err(RuntimeError::TensorMismatch(format!(
                "input {} has {} elements, expected {elements}",
                input.index(),
                bytes.len() / 4
            )));
        }
        for (acc, chunk) in sum.iter_mut().zip(bytes.chunks_exact(4)) {
            *acc += f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }

    if output.len() < elements * 4 {
        return Err(RuntimeError::Workload(format!(
            "output holds {} bytes, need {}",
            output.len(),
            elements * 4
        )));
    }
    let dst = output.as_bytes_mut();
    for (chunk, value) in dst.chunks_exact_mut(4).zip(&sum) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    output.set_shape(first.info().dimensions.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_unload_network() {
        let rt = ReferenceRuntime::new();
        let id = rt.load_network(ReferenceNetwork::Identity);
        assert!(rt.is_loaded(id));
        rt.unload_network(id).unwrap();
        assert!(!rt.is_loaded(id));
        assert!(matches!(rt.unload_network(id), Err(RuntimeError::UnknownNetwork(_))));
    }

    #[test]
    fn unknown_network_fails_workload() {
        let rt = ReferenceRuntime::new();
        let err = rt.enqueue_workload(NetworkId(99), &[], &mut []).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownNetwork(NetworkId(99))));
        assert_eq!(rt.workloads(), 0);
    }

    #[test]
    fn profiling_flag_is_tracked() {
        let rt = ReferenceRuntime::new();
        let id = rt.load_network(ReferenceNetwork::AddFloat32);
        rt.set_profiling(id, true);
        assert!(rt.is_profiling(id));
        rt.set_profiling(id, false);
        assert!(!rt.is_profiling(id));
    }
}
