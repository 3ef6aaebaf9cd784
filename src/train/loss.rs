//! Loss functions for training

use crate::amp::round_to_half;
use crate::autograd::{autocast_enabled, grad_enabled, BackwardOp};
use crate::{Error, Result, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Trait for loss functions
pub trait LossFn {
    /// Scalar loss wired into the predictions' graph
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Result<Tensor>;

    fn name(&self) -> &str;
}

/// Mean Squared Error Loss
///
/// L = mean((predictions - targets)²)
///
/// # Example
///
/// ```
/// use bucle::train::{LossFn, MSELoss};
/// use bucle::Tensor;
///
/// let pred = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
/// let target = Tensor::from_vec(vec![1.5, 2.5, 3.5], false);
///
/// let loss = MSELoss.forward(&pred, &target).unwrap();
/// assert!((loss.item() - 0.25).abs() < 1e-6);
/// ```
pub struct MSELoss;

impl LossFn for MSELoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Result<Tensor> {
        if predictions.len() != targets.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![predictions.len()],
                got: vec![targets.len()],
            });
        }

        let diff = predictions.data() - targets.data();
        let mse = (&diff * &diff).mean().unwrap_or(0.0);
        let value = Array1::from(vec![mse]);
        let value = if autocast_enabled() {
            round_to_half(value)
        } else {
            value
        };

        let record = predictions.requires_grad() && grad_enabled();
        let mut loss = Tensor::new(value, record);

        if record {
            // d(MSE)/d(pred) = 2 * (pred - target) / n
            let n = predictions.len().max(1) as f32;
            loss.set_backward_op(Rc::new(MSEBackward {
                predictions: predictions.clone(),
                local_grad: diff * (2.0 / n),
                result_grad: loss.grad_cell(),
            }));
        }

        Ok(loss)
    }

    fn name(&self) -> &str {
        "MSE"
    }
}

struct MSEBackward {
    predictions: Tensor,
    local_grad: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MSEBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.predictions]
    }

    fn backward(&self) {
        let Some(upstream) = self.result_grad.borrow().as_ref().and_then(|g| g.first().copied())
        else {
            return;
        };
        self.predictions.accumulate_grad(&self.local_grad * upstream);
    }
}
