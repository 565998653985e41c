//! Tensor element types and declared shapes.

use serde::{Deserialize, Serialize};

/// Element type of a tensor operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandType {
    Float32,
    Float16,
    Int32,
    QuantAsymm8,
    QuantSymm8,
    Bool8,
}

impl OperandType {
    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float16 => 2,
            Self::QuantAsymm8 | Self::QuantSymm8 | Self::Bool8 => 1,
        }
    }
}

/// Shape and element type of one tensor. A dimension of `0` is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorInfo {
    pub dimensions: Vec<u32>,
    pub data_type: OperandType,
}

impl TensorInfo {
    pub fn new(dimensions: Vec<u32>, data_type: OperandType) -> Self {
        Self { dimensions, data_type }
    }

    /// True when every dimension is known.
    pub fn is_fully_specified(&self) -> bool {
        self.dimensions.iter().all(|&d| d != 0)
    }

    /// Number of elements, or `None` if any dimension is unknown.
    pub fn num_elements(&self) -> Option<usize> {
        if !self.is_fully_specified() {
            return None;
        }
        self.dimensions
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
    }

    /// Required buffer size in bytes, or `None` if the shape is unknown.
    pub fn num_bytes(&self) -> Option<usize> {
        self.num_elements()?.checked_mul(self.data_type.element_size())
    }

    /// Merge caller-provided dimensions into the declared shape.
    ///
    /// Empty `provided` keeps the declared shape. Otherwise the rank must
    /// match and every known declared dimension must agree.
    pub fn resolve(&self, provided: &[u32]) -> Option<TensorInfo> {
        if provided.is_empty() {
            return Some(self.clone());
        }
        if !self.dimensions.is_empty() && provided.len() != self.dimensions.len() {
            return None;
        }
        let mut dimensions = Vec::with_capacity(provided.len());
        for (i, &p) in provided.iter().enumerate() {
            let declared = self.dimensions.get(i).copied().unwrap_or(0);
            let dim = match (declared, p) {
                (0, p) => p,
                (d, 0) => d,
                (d, p) if d == p => d,
                _ => return None,
            };
            dimensions.push(dim);
        }
        Some(TensorInfo { dimensions, data_type: self.data_type })
    }
}
