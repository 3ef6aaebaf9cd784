//! Tape-based autograd engine
//!
//! Provides automatic differentiation using a computational graph with gradient tape.
//! Graph recording can be switched off with [`no_grad`], and forward passes can be
//! run in emulated half precision with [`autocast`].

mod backward;
mod context;
mod ops;
mod tensor;


pub use backward::BackwardOp;
pub use context::{autocast, autocast_enabled, grad_enabled, no_grad};
pub use ops::*;
pub use tensor::Tensor;

use std::collections::HashSet;
use std::rc::Rc;

/// Perform backward pass on a tensor
///
/// `grad_output` seeds the output gradient; `None` seeds with ones. Ops are
/// run in reverse topological order, so a tensor that feeds several ops has
/// its gradient fully summed before it is pushed further back.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    let Some(root) = tensor.backward_op() else {
        return;
    };
    for op in topological_order(root) {
        op.backward();
    }
}

/// Ops reachable from `root`, each listed before every op it feeds from
fn topological_order(root: Rc<dyn BackwardOp>) -> Vec<Rc<dyn BackwardOp>> {
    let mut visited: HashSet<*const ()> = HashSet::new();
    let mut post_order = Vec::new();
    let mut stack = vec![(root, false)];

    while let Some((op, expanded)) = stack.pop() {
        if expanded {
            post_order.push(op);
            continue;
        }
        if !visited.insert(Rc::as_ptr(&op).cast::<()>()) {
            continue;
        }
        let children: Vec<_> = op.inputs().iter().filter_map(|t| t.backward_op()).collect();
        stack.push((op, true));
        for child in children {
            if !visited.contains(&Rc::as_ptr(&child).cast::<()>()) {
                stack.push((child, false));
            }
        }
    }

    post_order.reverse();
    post_order
}
