//! Tensor binding: request regions to typed tensor views.
//!
//! Binding is pure translation. Validation happens on the caller's thread
//! before a request is queued; the zero-copy views are only materialized on
//! the worker thread, against exclusively locked pools. Regions that alias
//! each other are staged so no two live views overlap mutably.

mod binder;
mod tensor;

pub use binder::{BindingSet, TensorBinder};
pub use tensor::{InputTensor, OutputTensor, TensorBinding};
pub(crate) use tensor::{bind_views, Staging};
