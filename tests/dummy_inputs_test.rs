//! Warm-up execution over zero-filled tensors.

use std::sync::Arc;

use nn_dispatch::config::DriverConfig;
use nn_dispatch::execution::PreparedModelOptions;
use nn_dispatch::model::{Model, OperandType, TensorInfo};
use nn_dispatch::runtime::{NetworkId, ReferenceNetwork, ReferenceRuntime};
use nn_dispatch::Driver;

fn setup() -> (Arc<ReferenceRuntime>, Driver) {
    let runtime = Arc::new(ReferenceRuntime::new());
    let driver = Driver::new(runtime.clone(), DriverConfig::default()).unwrap();
    (runtime, driver)
}

#[test]
fn test_dummy_inputs_on_valid_network() {
    let (runtime, driver) = setup();
    let info = TensorInfo::new(vec![2, 3], OperandType::Float32);
    let model = driver.prepare_model(
        runtime.load_network(ReferenceNetwork::AddFloat32),
        Model::new(vec![info.clone(), info.clone()], vec![info]),
    );

    assert!(model.execute_with_dummy_inputs());
    assert_eq!(runtime.workloads(), 1);
    // Warm-up runs are not client requests.
    assert_eq!(model.request_count(), 0);
    assert_eq!(driver.worker().processed(), 1);
}

#[test]
fn test_dummy_inputs_mixed_types() {
    let (runtime, driver) = setup();
    let model = driver.prepare_model(
        runtime.load_network(ReferenceNetwork::Identity),
        Model::new(
            vec![
                TensorInfo::new(vec![4], OperandType::QuantAsymm8),
                TensorInfo::new(vec![2, 2], OperandType::Float16),
            ],
            vec![
                TensorInfo::new(vec![4], OperandType::QuantAsymm8),
                TensorInfo::new(vec![2, 2], OperandType::Float16),
            ],
        ),
    );
    assert!(model.execute_with_dummy_inputs());
}

#[test]
fn test_dummy_inputs_fail_on_unloaded_network() {
    let (_runtime, driver) = setup();
    let info = TensorInfo::new(vec![1], OperandType::Float32);
    let model = driver.prepare_model(NetworkId(404), Model::new(vec![info.clone()], vec![info]));
    assert!(!model.execute_with_dummy_inputs());
}

#[test]
fn test_dummy_inputs_fail_on_dynamic_shapes() {
    let (runtime, driver) = setup();
    let dynamic = TensorInfo::new(vec![0, 4], OperandType::Float32);
    let model = driver.prepare_model(
        runtime.load_network(ReferenceNetwork::Identity),
        Model::new(vec![dynamic.clone()], vec![dynamic]),
    );
    assert!(!model.execute_with_dummy_inputs());
    assert_eq!(runtime.workloads(), 0);
}

#[test]
fn test_dummy_inputs_are_not_dumped() {
    let (runtime, driver) = setup();
    let dir = tempfile::tempdir().unwrap();
    let info = TensorInfo::new(vec![1], OperandType::Float32);
    let model = driver.prepare_model_with_options(
        runtime.load_network(ReferenceNetwork::Identity),
        Model::new(vec![info.clone()], vec![info]),
        PreparedModelOptions { dump_dir: Some(dir.path().to_path_buf()), profiling_enabled: false },
    );

    assert!(model.execute_with_dummy_inputs());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
