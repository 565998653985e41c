//! Model and request descriptors consumed by the dispatch core.
//!
//! A `Model` is the declared tensor layout of one compiled network. A
//! `Request` describes where each input and output lives inside the
//! caller-supplied memory regions.

mod operand;
mod request;

pub use operand::{OperandType, TensorInfo};
pub use request::{DataLocation, Request, RequestArgument};

/// Declared input and output tensors of a prepared network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
    /// Reject requests whose output regions overlap any other region.
    pub strict_no_alias: bool,
}

impl Model {
    pub fn new(inputs: Vec<TensorInfo>, outputs: Vec<TensorInfo>) -> Self {
        Self { inputs, outputs, strict_no_alias: false }
    }

    /// Same model, but with overlapping output regions rejected.
    pub fn with_strict_no_alias(mut self) -> Self {
        self.strict_no_alias = true;
        self
    }
}
