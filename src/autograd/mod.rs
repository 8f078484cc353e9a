//! Tape-based autograd engine
//!
//! Provides automatic differentiation using a computational graph with gradient tape.

mod backward;
mod context;
mod ops;
mod tensor;


pub use backward::BackwardOp;
pub use context::Context;
pub use ops::*;
pub use tensor::{GradCell, Tensor};

use std::collections::HashSet;
use std::rc::Rc;

/// Perform backward pass on a tensor
///
/// Every operation in the graph runs exactly once, after all of its consumers,
/// so tensors used several times receive their summed gradient before it is
/// propagated further.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        // Initialize with ones for scalar loss
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    for op in topological_ops(tensor).into_iter().rev() {
        op.backward();
    }
}

/// Backward operations reachable from `root`, inputs before consumers
fn topological_ops(root: &Tensor) -> Vec<Rc<dyn BackwardOp>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    // (tensor, children_pushed)
    let mut stack = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        let Some(op) = node.backward_op() else {
            continue;
        };
        if expanded {
            order.push(op);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        stack.push((node, true));
        for input in op.inputs() {
            if input.backward_op().is_some() && !visited.contains(&input.id()) {
                stack.push((input, false));
            }
        }
    }

    order
}
