//! Backward operation trait

use super::Tensor;

/// Trait for backward pass operations
///
/// An op only pushes its own output gradient into its inputs. The walk over
/// the graph is driven by [`crate::backward`], which runs every op once and
/// only after all of its consumers have finished.
pub trait BackwardOp {
    /// Tensors this op sends gradients to
    fn inputs(&self) -> Vec<&Tensor>;

    /// Accumulate the finished output gradient into the inputs
    fn backward(&self);
}
