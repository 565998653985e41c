//! Requests whose regions overlap on a model that permits aliasing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nn_dispatch::binding::{InputTensor, OutputTensor};
use nn_dispatch::config::DriverConfig;
use nn_dispatch::execution::{ExecutionStatus, MeasureTiming};
use nn_dispatch::memory::{MemoryPool, MemoryRegion};
use nn_dispatch::model::{DataLocation, Model, OperandType, Request, RequestArgument, TensorInfo};
use nn_dispatch::runtime::{InferenceRuntime, NetworkId, ReferenceNetwork, ReferenceRuntime, RuntimeError};
use nn_dispatch::Driver;

fn bytes_model(len: u32, outputs: usize) -> Model {
    let info = TensorInfo::new(vec![len], OperandType::QuantAsymm8);
    Model::new(vec![info.clone()], vec![info; outputs])
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn read_f32(pool: &MemoryPool, offset: usize, n: usize) -> Vec<f32> {
    pool.read(offset, n * 4)
        .unwrap()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn arg(offset: usize, length: usize) -> RequestArgument {
    RequestArgument::new(DataLocation::new(0, offset, length))
}

#[test]
fn test_in_place_identity_shifts_bytes() {
    let runtime = Arc::new(ReferenceRuntime::new());
    let driver = Driver::new(runtime.clone(), DriverConfig::default()).unwrap();
    let model = driver.prepare_model(runtime.load_network(ReferenceNetwork::Identity), bytes_model(8, 1));

    let pool = MemoryPool::from_bytes((1..=12).collect());
    let request = Request {
        inputs: vec![arg(0, 8)],
        outputs: vec![arg(4, 8)],
        pools: vec![MemoryRegion::Shared(pool.clone())],
    };

    let result = model.execute_sync(&request, MeasureTiming::No);
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(pool.read(0, 12).unwrap(), vec![1, 2, 3, 4, 1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_in_place_add_accumulates_into_first_input() {
    let runtime = Arc::new(ReferenceRuntime::new());
    let driver = Driver::new(runtime.clone(), DriverConfig::default()).unwrap();
    let info = TensorInfo::new(vec![2], OperandType::Float32);
    let model = driver.prepare_model(
        runtime.load_network(ReferenceNetwork::AddFloat32),
        Model::new(vec![info.clone(), info.clone()], vec![info]),
    );

    let mut bytes = f32_bytes(&[1.0, 2.0]);
    bytes.extend(f32_bytes(&[0.5, 0.25]));
    let pool = MemoryPool::from_bytes(bytes);
    let request = Request {
        inputs: vec![arg(0, 8), arg(8, 8)],
        outputs: vec![arg(0, 8)],
        pools: vec![MemoryRegion::Shared(pool.clone())],
    };

    assert!(model.execute_sync(&request, MeasureTiming::No).status.is_success());
    assert_eq!(read_f32(&pool, 0, 2), vec![1.5, 2.25]);
    assert_eq!(read_f32(&pool, 8, 2), vec![0.5, 0.25]);
}

/// Runtime that checks whether any views it is handed share memory with
/// a writable view, then writes a marker into every output.
#[derive(Default)]
struct OverlapCheckingRuntime {
    saw_shared_memory: AtomicBool,
}

fn ranges_overlap(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.0 + b.1 && b.0 < a.0 + a.1
}

impl InferenceRuntime for OverlapCheckingRuntime {
    fn enqueue_workload(
        &self,
        _: NetworkId,
        inputs: &[InputTensor<'_>],
        outputs: &mut [OutputTensor<'_>],
    ) -> Result<(), RuntimeError> {
        let ins: Vec<(usize, usize)> = inputs.iter().map(|t| (t.as_ptr() as usize, t.len())).collect();
        let outs: Vec<(usize, usize)> =
            outputs.iter_mut().map(|t| (t.as_mut_ptr() as usize, t.len())).collect();

        let input_output = ins.iter().any(|i| outs.iter().any(|o| ranges_overlap(*i, *o)));
        let output_output = outs
            .iter()
            .enumerate()
            .any(|(n, a)| outs[..n].iter().any(|b| ranges_overlap(*a, *b)));
        if input_output || output_output {
            self.saw_shared_memory.store(true, Ordering::SeqCst);
        }

        for (marker, output) in (0xA0u8..).zip(outputs.iter_mut()) {
            output.as_bytes_mut().fill(marker);
        }
        Ok(())
    }

    fn unload_network(&self, _: NetworkId) -> Result<(), RuntimeError> {
        Ok(())
    }
}

#[test]
fn test_overlapping_regions_never_share_memory_with_a_writable_view() {
    let runtime = Arc::new(OverlapCheckingRuntime::default());
    let driver = Driver::new(runtime.clone(), DriverConfig::default()).unwrap();
    let model = driver.prepare_model(NetworkId(3), bytes_model(4, 2));

    let pool = MemoryPool::from_bytes(vec![7; 12]);
    let request = Request {
        inputs: vec![arg(0, 4)],
        outputs: vec![arg(2, 4), arg(4, 4)],
        pools: vec![MemoryRegion::Shared(pool.clone())],
    };

    let result = model.execute_sync(&request, MeasureTiming::No);
    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(!runtime.saw_shared_memory.load(Ordering::SeqCst));
    // Output 1 is written back after output 0 and wins the shared bytes.
    assert_eq!(pool.read(0, 12).unwrap(), vec![7, 7, 0xA0, 0xA0, 0xA1, 0xA1, 0xA1, 0xA1, 7, 7, 7, 7]);
}

#[test]
fn test_strict_model_rejects_the_same_overlap() {
    let runtime = Arc::new(ReferenceRuntime::new());
    let driver = Driver::new(runtime.clone(), DriverConfig::default()).unwrap();
    let model = driver.prepare_model(
        runtime.load_network(ReferenceNetwork::Identity),
        bytes_model(8, 1).with_strict_no_alias(),
    );

    let pool = MemoryPool::shared(12);
    let request = Request {
        inputs: vec![arg(0, 8)],
        outputs: vec![arg(4, 8)],
        pools: vec![MemoryRegion::Shared(pool)],
    };

    let result = model.execute_sync(&request, MeasureTiming::No);
    assert_eq!(result.status, ExecutionStatus::InvalidArgument);
    assert_eq!(runtime.workloads(), 0);
}
