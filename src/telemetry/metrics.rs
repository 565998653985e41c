//! Metric recorders for execution outcomes and queue depth.

use crate::execution::{ExecutionStatus, Timing};
use crate::runtime::NetworkId;

pub fn record_execution_success(network: NetworkId, timing: &Timing) {
    let network = network.to_string();
    metrics::counter!("nn_dispatch_executions_total", "network" => network.clone(), "status" => "success")
        .increment(1);
    if let Some(device) = timing.time_on_device {
        metrics::histogram!("nn_dispatch_device_time_us", "network" => network.clone())
            .record(device.as_micros() as f64);
    }
    if let Some(driver) = timing.time_in_driver {
        metrics::histogram!("nn_dispatch_driver_time_us", "network" => network)
            .record(driver.as_micros() as f64);
    }
}

pub fn record_execution_failure(network: NetworkId, status: ExecutionStatus) {
    metrics::counter!(
        "nn_dispatch_executions_total",
        "network" => network.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_validation_rejection(network: NetworkId, status: ExecutionStatus) {
    metrics::counter!(
        "nn_dispatch_rejections_total",
        "network" => network.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_queue_depth(depth: usize) {
    metrics::gauge!("nn_dispatch_queue_depth").set(depth as f64);
}

pub fn record_in_flight(network: NetworkId, count: usize) {
    metrics::gauge!("nn_dispatch_requests_in_flight", "network" => network.to_string()).set(count as f64);
}
