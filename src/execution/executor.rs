//! The runtime call for one work item.
//!
//! Runs on the worker thread only. Device time, when measured, covers the
//! `enqueue_workload` call and nothing else.

use std::time::Instant;

use super::error::ExecutionStatus;
use super::notifier::{ExecutionResult, OutputShape, Timing};
use crate::binding::{bind_views, OutputTensor, Staging};
use crate::model::TensorInfo;
use crate::scheduler::WorkItem;

/// Execute one work item against its network's runtime.
pub fn execute_work_item(item: &WorkItem) -> ExecutionResult {
    let network = &item.network;
    let mut guards: Vec<_> = item.pools.iter().map(|p| p.lock_exclusive()).collect();
    let mut staging = Staging::default();

    let (inputs, mut outputs) =
        match bind_views(&mut guards, &mut staging, &item.bindings.inputs, &item.bindings.outputs) {
            Ok(views) => views,
            Err(e) => {
                tracing::error!(network_id = %network.id(), error = %e, "failed to bind tensors");
                return ExecutionResult::failure(e.status());
            }
        };

    if let Some(dumper) = &item.dumper {
        dumper.dump_inputs(&inputs);
    }

    let device_start = item.context.is_measuring().then(Instant::now);
    let outcome = network.runtime().enqueue_workload(network.id(), &inputs, &mut outputs);
    let device_time = device_start.map(|start| start.elapsed());

    if let Err(e) = outcome {
        tracing::error!(network_id = %network.id(), error = %e, "workload failed");
        return ExecutionResult::failure(ExecutionStatus::GeneralFailure);
    }

    if let Some(dumper) = &item.dumper {
        dumper.dump_outputs(&outputs);
    }

    let (status, output_shapes) = resolve_output_shapes(&item.bindings.output_shapes, &outputs);

    drop(inputs);
    drop(outputs);
    staging.write_back(&mut guards);
    drop(guards);
    if let Err(e) = item.pools.commit() {
        tracing::warn!(network_id = %network.id(), error = %e, "failed to commit memory pools");
    }

    let timing = if status.is_success() {
        item.context.timing(device_time)
    } else {
        Timing::UNAVAILABLE
    };
    ExecutionResult { status, output_shapes, timing }
}

/// Apply shapes reported by the runtime to the declared output shapes.
///
/// A reported shape larger than its buffer marks the output insufficient.
fn resolve_output_shapes(
    declared: &[OutputShape],
    outputs: &[OutputTensor<'_>],
) -> (ExecutionStatus, Vec<OutputShape>) {
    let mut status = ExecutionStatus::Success;
    let shapes = declared
        .iter()
        .zip(outputs)
        .map(|(shape, view)| match view.reported_shape() {
            None => shape.clone(),
            Some(dims) => {
                let needed = TensorInfo::new(dims.to_vec(), view.info().data_type).num_bytes();
                let is_sufficient = needed.map_or(true, |n| n <= view.len());
                if !is_sufficient {
                    status = ExecutionStatus::OutputInsufficientSize;
                }
                OutputShape { dimensions: dims.to_vec(), is_sufficient }
            }
        })
        .collect();
    (status, shapes)
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
