//! Backward operation trait

use super::Tensor;

/// Trait for backward pass operations
///
/// An operation only propagates its own output gradient to its immediate
/// inputs. Graph traversal is driven by [`crate::autograd::backward`].
pub trait BackwardOp {
    /// Inputs this operation was computed from
    fn inputs(&self) -> Vec<Tensor>;

    /// Push the output gradient one level down to the inputs
    fn backward(&self);
}
