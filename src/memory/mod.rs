//! Request memory pools.
//!
//! Provides shared and file-backed pools plus the per-request pool set
//! that travels with a work item across the worker boundary.

mod pool;

pub use pool::{MemoryPool, MemoryPoolSet, MemoryRegion, ReleaseHook};
pub(crate) use pool::PoolStorage;
