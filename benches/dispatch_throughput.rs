//! Dispatch throughput benchmarks.
//!
//! Measures validation cost on the caller thread and end-to-end round trips
//! through the shared worker.

use std::sync::{mpsc, Arc};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use nn_dispatch::binding::TensorBinder;
use nn_dispatch::config::DriverConfig;
use nn_dispatch::execution::{Completion, MeasureTiming, PreparedModel};
use nn_dispatch::memory::{MemoryPool, MemoryPoolSet, MemoryRegion};
use nn_dispatch::model::{DataLocation, Model, OperandType, Request, RequestArgument, TensorInfo};
use nn_dispatch::runtime::{ReferenceNetwork, ReferenceRuntime};
use nn_dispatch::Driver;

fn identity_model(elements: u32) -> Model {
    let info = TensorInfo::new(vec![elements], OperandType::Float32);
    Model::new(vec![info.clone()], vec![info])
}

fn identity_request(elements: usize) -> Request {
    let bytes = elements * 4;
    Request {
        inputs: vec![RequestArgument::new(DataLocation::new(0, 0, bytes))],
        outputs: vec![RequestArgument::new(DataLocation::new(0, bytes, bytes))],
        pools: vec![MemoryRegion::Shared(MemoryPool::shared(bytes * 2))],
    }
}

fn setup(elements: u32) -> (Driver, PreparedModel) {
    let runtime = Arc::new(ReferenceRuntime::new());
    let driver = Driver::new(runtime.clone(), DriverConfig::default()).expect("worker");
    let model = driver.prepare_model(runtime.load_network(ReferenceNetwork::Identity), identity_model(elements));
    (driver, model)
}

fn bench_bind(c: &mut Criterion) {
    let mut group = c.benchmark_group("tensor_bind");

    for elements in [16usize, 1024, 65536] {
        let model = identity_model(elements as u32);
        let request = identity_request(elements);
        let pools = MemoryPoolSet::map(&request.pools).expect("pools");

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::from_parameter(elements), |b| {
            b.iter(|| TensorBinder::new(&model).bind(black_box(&request), &pools))
        });
    }

    group.finish();
}

fn bench_sync_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_sync");

    for elements in [16usize, 1024, 65536] {
        let (_driver, model) = setup(elements as u32);
        let request = identity_request(elements);

        group.throughput(Throughput::Bytes((elements * 4) as u64));
        group.bench_function(BenchmarkId::from_parameter(elements), |b| {
            b.iter(|| model.execute_sync(black_box(&request), MeasureTiming::No))
        });
    }

    group.finish();
}

fn bench_async_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_async_burst");

    for burst in [1usize, 16, 128] {
        let (_driver, model) = setup(16);
        let requests: Vec<Request> = (0..burst).map(|_| identity_request(16)).collect();

        group.throughput(Throughput::Elements(burst as u64));
        group.bench_function(BenchmarkId::new("requests", burst), |b| {
            b.iter(|| {
                let (tx, rx) = mpsc::channel();
                for request in &requests {
                    let tx = tx.clone();
                    model.execute_async(
                        request,
                        MeasureTiming::Yes,
                        Completion::from_fn(move |r| {
                            let _ = tx.send(r.status);
                        }),
                    );
                }
                drop(tx);
                rx.iter().count()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_bind, bench_sync_round_trip, bench_async_burst);
criterion_main!(benches);
