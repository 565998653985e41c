//! Tensor bindings and the views handed to the runtime.

use std::marker::PhantomData;

use parking_lot::RwLockWriteGuard;

use crate::execution::ExecutionError;
use crate::memory::PoolStorage;
use crate::model::{DataLocation, TensorInfo};

/// One validated input or output of a request, before it is materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorBinding {
    pub index: usize,
    pub location: DataLocation,
    /// Resolved shape. May still contain unknown dimensions for outputs.
    pub info: TensorInfo,
}

/// Read-only view of an input tensor.
///
/// Points into the locked pool, or into a staged copy when the input
/// overlaps an output. Never overlaps a live output view.
pub struct InputTensor<'a> {
    index: usize,
    info: TensorInfo,
    ptr: *const u8,
    len: usize,
    _pool: PhantomData<&'a [u8]>,
}

impl<'a> InputTensor<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: ptr/len were bounds-checked in `bind_views`, the backing
        // pool or staging buffer outlives 'a, and no output view overlaps it.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// Writable view of an output tensor.
///
/// Output views are pairwise disjoint. One that overlaps an earlier output
/// writes to a staged buffer that is copied back into the pool afterwards.
pub struct OutputTensor<'a> {
    index: usize,
    info: TensorInfo,
    ptr: *mut u8,
    len: usize,
    reported_shape: Option<Vec<u32>>,
    _pool: PhantomData<&'a mut [u8]>,
}

impl<'a> OutputTensor<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: see `InputTensor::as_bytes`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `InputTensor::as_bytes`; no other view overlaps this
        // one and `&mut self` keeps this the only slice handed out from it.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Report the shape the runtime actually produced.
    pub fn set_shape(&mut self, dimensions: Vec<u32>) {
        self.reported_shape = Some(dimensions);
    }

    pub fn reported_shape(&self) -> Option<&[u32]> {
        self.reported_shape.as_deref()
    }
}

/// Scratch copies for regions that alias another bound region.
///
/// Lives alongside the pool guards for one execution. `write_back` copies
/// staged outputs into their pools in output order, so where outputs
/// overlap the later one wins.
#[derive(Debug, Default)]
pub(crate) struct Staging {
    buffers: Vec<Vec<u8>>,
    /// (buffer, pool region) for every staged output.
    outputs: Vec<(usize, DataLocation)>,
}

impl Staging {
    fn stage(&mut self, storages: &[RwLockWriteGuard<'_, PoolStorage>], loc: DataLocation) -> usize {
        let bytes = storages[loc.pool_index].as_slice()[loc.offset..loc.offset + loc.length].to_vec();
        self.buffers.push(bytes);
        self.buffers.len() - 1
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Copy staged outputs back into the pools they stand in for.
    pub(crate) fn write_back(&self, storages: &mut [RwLockWriteGuard<'_, PoolStorage>]) {
        for &(buffer, loc) in &self.outputs {
            storages[loc.pool_index].as_mut_slice()[loc.offset..loc.offset + loc.length]
                .copy_from_slice(&self.buffers[buffer]);
        }
    }
}

fn check_bounds(
    storages: &[RwLockWriteGuard<'_, PoolStorage>],
    binding: &TensorBinding,
) -> Result<(), ExecutionError> {
    let loc = binding.location;
    let size = storages
        .get(loc.pool_index)
        .map(|guard| guard.as_slice().len())
        .ok_or_else(|| ExecutionError::InvalidArgument(format!("pool {} is not mapped", loc.pool_index)))?;
    match loc.end() {
        Some(end) if end <= size => Ok(()),
        _ => Err(ExecutionError::InvalidArgument(format!(
            "tensor {} exceeds pool {}",
            binding.index, loc.pool_index
        ))),
    }
}

/// Materialize views for validated bindings over locked pool storage.
///
/// Inputs overlapping any output read a staged copy taken before the
/// runtime runs. Outputs overlapping an earlier output write to a staged
/// buffer. What is left pointing into the pools is pairwise disjoint apart
/// from input/input overlap, which is read-only.
pub(crate) fn bind_views<'a>(
    storages: &'a mut [RwLockWriteGuard<'_, PoolStorage>],
    staging: &'a mut Staging,
    inputs: &[TensorBinding],
    outputs: &[TensorBinding],
) -> Result<(Vec<InputTensor<'a>>, Vec<OutputTensor<'a>>), ExecutionError> {
    for binding in inputs.iter().chain(outputs) {
        check_bounds(storages, binding)?;
    }

    let mut staged_inputs = vec![None; inputs.len()];
    for (slot, b) in staged_inputs.iter_mut().zip(inputs) {
        if outputs.iter().any(|o| o.location.overlaps(&b.location)) {
            *slot = Some(staging.stage(storages, b.location));
        }
    }
    let mut staged_outputs = vec![None; outputs.len()];
    for (i, b) in outputs.iter().enumerate() {
        if outputs[..i].iter().any(|o| o.location.overlaps(&b.location)) {
            let buffer = staging.stage(storages, b.location);
            staging.outputs.push((buffer, b.location));
            staged_outputs[i] = Some(buffer);
        }
    }
    if !staging.is_empty() {
        tracing::trace!(staged = staging.buffers.len(), "aliased tensors staged");
    }

    let bases: Vec<*mut u8> = storages.iter_mut().map(|guard| guard.as_mut_slice().as_mut_ptr()).collect();
    let scratch: Vec<*mut u8> = staging.buffers.iter_mut().map(|b| b.as_mut_ptr()).collect();

    let locate = |binding: &TensorBinding, staged: Option<usize>| -> *mut u8 {
        match staged {
            Some(buffer) => scratch[buffer],
            // SAFETY: offset + length was bounds-checked against the pool.
            None => unsafe { bases[binding.location.pool_index].add(binding.location.offset) },
        }
    };

    let input_views = inputs
        .iter()
        .zip(staged_inputs)
        .map(|(b, staged)| InputTensor {
            index: b.index,
            info: b.info.clone(),
            ptr: locate(b, staged).cast_const(),
            len: b.location.length,
            _pool: PhantomData,
        })
        .collect();

    let output_views = outputs
        .iter()
        .zip(staged_outputs)
        .map(|(b, staged)| OutputTensor {
            index: b.index,
            info: b.info.clone(),
            ptr: locate(b, staged),
            len: b.location.length,
            reported_shape: None,
            _pool: PhantomData,
        })
        .collect();

    Ok((input_views, output_views))
}
