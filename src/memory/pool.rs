//! Memory pools backing request tensors.
//!
//! Uses parking_lot::RwLock for fast synchronous locking. The worker holds
//! the write lock on every pool of a request for the duration of one
//! execution; callers read results back once the completion has fired.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::MmapMut;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use crate::execution::ExecutionError;

/// Backing storage of a pool.
pub(crate) enum PoolStorage {
    Heap(Box<[u8]>),
    Mapped(MmapMut),
}

impl PoolStorage {
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Self::Heap(buf) => &buf[..],
            Self::Mapped(map) => &map[..],
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Self::Heap(buf) => &mut buf[..],
            Self::Mapped(map) => &mut map[..],
        }
    }
}

/// A region of memory shared between a client and the driver.
pub struct MemoryPool {
    storage: RwLock<PoolStorage>,
    size: usize,
    source: Option<PathBuf>,
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("size", &self.size)
            .field("source", &self.source)
            .finish()
    }
}

impl MemoryPool {
    /// Allocate a zero-filled shared pool.
    pub fn shared(size: usize) -> Arc<Self> {
        Self::from_bytes(vec![0u8; size])
    }

    /// Wrap existing bytes as a shared pool.
    pub fn from_bytes(bytes: Vec<u8>) -> Arc<Self> {
        let size = bytes.len();
        Arc::new(Self {
            storage: RwLock::new(PoolStorage::Heap(bytes.into_boxed_slice())),
            size,
            source: None,
        })
    }

    /// Map a file read-write as a pool.
    pub fn map_file(path: &Path) -> Result<Arc<Self>, ExecutionError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ExecutionError::PoolMapping(format!("{}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| ExecutionError::PoolMapping(format!("{}: {e}", path.display())))?
            .len();
        if len == 0 {
            return Err(ExecutionError::PoolMapping(format!(
                "{}: cannot map an empty file",
                path.display()
            )));
        }

        // SAFETY: the mapping is only accessed through the pool's RwLock.
        // Concurrent modification of the file by another process is the
        // client's responsibility, as with any shared-memory region.
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| ExecutionError::PoolMapping(format!("{}: {e}", path.display())))?;

        Ok(Arc::new(Self {
            size: map.len(),
            storage: RwLock::new(PoolStorage::Mapped(map)),
            source: Some(path.to_path_buf()),
        }))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy `len` bytes starting at `offset` out of the pool.
    pub fn read(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let end = offset.checked_add(len)?;
        let storage = self.storage.read();
        storage.as_slice().get(offset..end).map(<[u8]>::to_vec)
    }

    /// Copy `data` into the pool at `offset`. Returns false when out of range.
    pub fn write(&self, offset: usize, data: &[u8]) -> bool {
        let Some(end) = offset.checked_add(data.len()) else {
            return false;
        };
        let mut storage = self.storage.write();
        match storage.as_mut_slice().get_mut(offset..end) {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Run `f` over the whole pool contents.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.storage.read().as_slice())
    }

    /// Flush written data to the backing file, if any.
    pub fn commit(&self) -> std::io::Result<()> {
        match &*self.storage.read() {
            PoolStorage::Heap(_) => Ok(()),
            PoolStorage::Mapped(map) => map.flush(),
        }
    }

    pub(crate) fn lock_exclusive(&self) -> RwLockWriteGuard<'_, PoolStorage> {
        self.storage.write()
    }
}

/// A client-supplied memory region, before it is mapped into a pool.
#[derive(Debug, Clone)]
pub enum MemoryRegion {
    /// Memory already shared with the driver.
    Shared(Arc<MemoryPool>),
    /// A file to be mapped for the duration of the request.
    MappedFile(PathBuf),
}

/// Callback fired when the last reference to a pool set is dropped.
pub type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// The mapped pools of one request.
///
/// Shared between the dispatcher and the queued work item through an
/// `Arc`; the pools stay valid until the completion has fired and the
/// last reference is gone.
pub struct MemoryPoolSet {
    pools: Vec<Arc<MemoryPool>>,
    on_release: Mutex<Option<ReleaseHook>>,
}

impl std::fmt::Debug for MemoryPoolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPoolSet").field("pools", &self.pools).finish()
    }
}

impl MemoryPoolSet {
    /// Map every region of a request, in order.
    pub fn map(regions: &[MemoryRegion]) -> Result<Self, ExecutionError> {
        let pools = regions
            .iter()
            .map(|region| match region {
                MemoryRegion::Shared(pool) => Ok(Arc::clone(pool)),
                MemoryRegion::MappedFile(path) => MemoryPool::map_file(path),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_pools(pools)
    }

    /// Build a set from already-mapped pools.
    ///
    /// The same pool may not appear twice: the worker locks each pool
    /// exclusively while a request runs.
    pub fn from_pools(pools: Vec<Arc<MemoryPool>>) -> Result<Self, ExecutionError> {
        for (i, pool) in pools.iter().enumerate() {
            if let Some(j) = pools[..i].iter().position(|p| Arc::ptr_eq(p, pool)) {
                return Err(ExecutionError::InvalidArgument(format!(
                    "memory pool {i} duplicates pool {j}"
                )));
            }
        }
        Ok(Self { pools, on_release: Mutex::new(None) })
    }

    /// Register a hook to run once the set is released.
    pub fn with_release_hook(self, hook: ReleaseHook) -> Self {
        *self.on_release.lock() = Some(hook);
        self
    }

    pub fn get(&self, index: usize) -> Option<&Arc<MemoryPool>> {
        self.pools.get(index)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MemoryPool>> {
        self.pools.iter()
    }

    /// Flush every file-backed pool.
    pub fn commit(&self) -> std::io::Result<()> {
        self.pools.iter().try_for_each(|p| p.commit())
    }
}

impl Drop for MemoryPoolSet {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.get_mut().take() {
            hook();
        }
    }
}
