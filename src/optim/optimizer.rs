//! Optimizer trait

use crate::{Result, Tensor};

/// Trait for optimization algorithms
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    fn lr(&self) -> f32;

    fn set_lr(&mut self, lr: f32);

    /// Serializable snapshot of hyperparameters and moment buffers
    fn state_dict(&self) -> Result<serde_json::Value>;

    /// Restore a snapshot produced by [`state_dict`](Self::state_dict)
    fn load_state_dict(&mut self, state: &serde_json::Value) -> Result<()>;
}
