//! Request validation against a model's declared tensors.
//!
//! All inputs are validated before reaching the worker. Invalid requests
//! are rejected, never truncated.

use crate::execution::{ExecutionError, OutputShape};
use crate::memory::MemoryPoolSet;
use crate::model::{Model, Request, RequestArgument, TensorInfo};

use super::TensorBinding;

/// Validated bindings for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSet {
    pub inputs: Vec<TensorBinding>,
    pub outputs: Vec<TensorBinding>,
    /// Shapes reported to the client; refined after execution.
    pub output_shapes: Vec<OutputShape>,
}

/// Maps a request's regions onto a model's declared inputs and outputs.
pub struct TensorBinder<'m> {
    model: &'m Model,
}

impl<'m> TensorBinder<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self { model }
    }

    /// Validate and bind both inputs and outputs.
    pub fn bind(&self, request: &Request, pools: &MemoryPoolSet) -> Result<BindingSet, ExecutionError> {
        let inputs = self.bind_inputs(&request.inputs, pools)?;
        let (outputs, output_shapes) = self.bind_outputs(&request.outputs, pools)?;
        if self.model.strict_no_alias {
            check_no_alias(&inputs, &outputs)?;
        }
        Ok(BindingSet { inputs, outputs, output_shapes })
    }

    pub fn bind_inputs(
        &self,
        args: &[RequestArgument],
        pools: &MemoryPoolSet,
    ) -> Result<Vec<TensorBinding>, ExecutionError> {
        check_count("input", args.len(), self.model.inputs.len())?;

        args.iter()
            .zip(&self.model.inputs)
            .enumerate()
            .map(|(index, (arg, declared))| {
                check_location("input", index, arg, pools)?;
                let info = resolve("input", index, declared, arg)?;
                let required = info.num_bytes().ok_or_else(|| {
                    ExecutionError::InvalidArgument(format!(
                        "input {index} has unknown dimensions {:?}",
                        info.dimensions
                    ))
                })?;
                if arg.location.length < required {
                    return Err(ExecutionError::InvalidArgument(format!(
                        "input {index} buffer too small: required {required} bytes, got {}",
                        arg.location.length
                    )));
                }
                Ok(TensorBinding { index, location: arg.location, info })
            })
            .collect()
    }

    pub fn bind_outputs(
        &self,
        args: &[RequestArgument],
        pools: &MemoryPoolSet,
    ) -> Result<(Vec<TensorBinding>, Vec<OutputShape>), ExecutionError> {
        check_count("output", args.len(), self.model.outputs.len())?;

        let mut bindings = Vec::with_capacity(args.len());
        let mut shapes = Vec::with_capacity(args.len());
        let mut insufficient = None;

        for (index, (arg, declared)) in args.iter().zip(&self.model.outputs).enumerate() {
            check_location("output", index, arg, pools)?;
            let info = resolve("output", index, declared, arg)?;

            let is_sufficient = match info.num_bytes() {
                Some(required) if arg.location.length < required => {
                    if insufficient.is_none() {
                        insufficient = Some((index, required, arg.location.length));
                    }
                    false
                }
                _ => true,
            };
            shapes.push(OutputShape { dimensions: info.dimensions.clone(), is_sufficient });
            bindings.push(TensorBinding { index, location: arg.location, info });
        }

        if let Some((index, required, provided)) = insufficient {
            return Err(ExecutionError::OutputInsufficientSize {
                index,
                required,
                provided,
                output_shapes: shapes,
            });
        }
        Ok((bindings, shapes))
    }
}

fn check_count(kind: &str, supplied: usize, declared: usize) -> Result<(), ExecutionError> {
    if supplied != declared {
        return Err(ExecutionError::InvalidArgument(format!(
            "expected {declared} {kind}s, got {supplied}"
        )));
    }
    Ok(())
}

fn check_location(
    kind: &str,
    index: usize,
    arg: &RequestArgument,
    pools: &MemoryPoolSet,
) -> Result<(), ExecutionError> {
    let loc = arg.location;
    let pool = pools.get(loc.pool_index).ok_or_else(|| {
        ExecutionError::InvalidArgument(format!(
            "{kind} {index} references pool {} of {}",
            loc.pool_index,
            pools.len()
        ))
    })?;
    match loc.end() {
        Some(end) if end <= pool.size() => Ok(()),
        _ => Err(ExecutionError::InvalidArgument(format!(
            "{kind} {index} region {}+{} exceeds pool {} of {} bytes",
            loc.offset,
            loc.length,
            loc.pool_index,
            pool.size()
        ))),
    }
}

fn resolve(
    kind: &str,
    index: usize,
    declared: &TensorInfo,
    arg: &RequestArgument,
) -> Result<TensorInfo, ExecutionError> {
    declared.resolve(&arg.dimensions).ok_or_else(|| {
        ExecutionError::InvalidArgument(format!(
            "{kind} {index} dimensions {:?} incompatible with declared {:?}",
            arg.dimensions, declared.dimensions
        ))
    })
}

fn check_no_alias(inputs: &[TensorBinding], outputs: &[TensorBinding]) -> Result<(), ExecutionError> {
    for (i, out) in outputs.iter().enumerate() {
        let clash_output = outputs[..i].iter().find(|o| o.location.overlaps(&out.location));
        if let Some(other) = clash_output {
            return Err(ExecutionError::InvalidArgument(format!(
                "output {} aliases output {}",
                out.index, other.index
            )));
        }
        if let Some(input) = inputs.iter().find(|t| t.location.overlaps(&out.location)) {
            return Err(ExecutionError::InvalidArgument(format!(
                "output {} aliases input {}",
                out.index, input.index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "binder_tests.rs"]
mod tests;
