//! Per-request layout descriptors.

use crate::memory::MemoryRegion;

/// Where a tensor lives: a byte range inside one request pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLocation {
    pub pool_index: usize,
    pub offset: usize,
    pub length: usize,
}

impl DataLocation {
    pub fn new(pool_index: usize, offset: usize, length: usize) -> Self {
        Self { pool_index, offset, length }
    }

    /// Exclusive end offset, `None` on overflow.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }

    /// True when both ranges are in the same pool and share a byte.
    pub fn overlaps(&self, other: &DataLocation) -> bool {
        if self.pool_index != other.pool_index || self.length == 0 || other.length == 0 {
            return false;
        }
        let (Some(a_end), Some(b_end)) = (self.end(), other.end()) else {
            return false;
        };
        self.offset < b_end && other.offset < a_end
    }
}

/// One input or output of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestArgument {
    pub location: DataLocation,
    /// Caller-provided shape. Empty means the declared shape.
    pub dimensions: Vec<u32>,
}

impl RequestArgument {
    pub fn new(location: DataLocation) -> Self {
        Self { location, dimensions: Vec::new() }
    }

    pub fn with_dimensions(location: DataLocation, dimensions: Vec<u32>) -> Self {
        Self { location, dimensions }
    }
}

/// An execution request: tensor locations plus the memory they point into.
#[derive(Debug, Clone)]
pub struct Request {
    pub inputs: Vec<RequestArgument>,
    pub outputs: Vec<RequestArgument>,
    pub pools: Vec<MemoryRegion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let a = DataLocation::new(0, 0, 4);
        let b = DataLocation::new(0, 4, 4);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn nested_ranges_overlap() {
        let a = DataLocation::new(0, 0, 16);
        let b = DataLocation::new(0, 4, 4);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn different_pools_never_overlap() {
        let a = DataLocation::new(0, 0, 16);
        let b = DataLocation::new(1, 0, 16);
        assert!(!a.overlaps(&b));
    }
}
