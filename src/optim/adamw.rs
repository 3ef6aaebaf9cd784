//! AdamW optimizer (Adam with decoupled Weight decay)

use super::adam::Moments;
use super::{from_state, to_state, Optimizer};
use crate::{Result, Tensor};
use serde::{Deserialize, Serialize};

/// AdamW optimizer
///
/// Weight decay is applied directly to the parameters instead of being added
/// to the gradient:
///
/// θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamW {
    lr: f32,
    weight_decay: f32,
    moments: Moments,
}

impl AdamW {
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            weight_decay,
            moments: Moments::new(beta1, beta2, epsilon),
        }
    }

    /// Create AdamW with default parameters (weight_decay = 0.01)
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, 0.01)
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [Tensor]) {
        let lr_t = self.moments.begin_step(self.lr, params.len());
        let decay = 1.0 - self.lr * self.weight_decay;

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad() {
                let update = self.moments.update(i, &grad, lr_t);
                let data = param.data_mut();
                *data *= decay;
                *data -= &update;
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state_dict(&self) -> Result<serde_json::Value> {
        self.moments.ensure_finite()?;
        to_state(self)
    }

    fn load_state_dict(&mut self, state: &serde_json::Value) -> Result<()> {
        *self = from_state(state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_adamw_weight_decay() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        let mut optimizer = AdamW::new(0.1, 0.9, 0.999, 1e-8, 0.1);

        // Zero gradient: only decay applies, (1 - 0.1 * 0.1) * 1.0
        params[0].set_grad(ndarray::arr1(&[0.0]));
        optimizer.step(&mut params);

        assert_abs_diff_eq!(params[0].data()[0], 0.99, epsilon = 1e-6);
    }

    #[test]
    fn test_adamw_vs_adam_difference() {
        let mut params_adamw = vec![Tensor::from_vec(vec![2.0, -2.0], true)];
        let mut params_adam = vec![Tensor::from_vec(vec![2.0, -2.0], true)];

        let mut adamw = AdamW::new(0.1, 0.9, 0.999, 1e-8, 0.1);
        let mut adam = crate::optim::Adam::default_params(0.1);

        for _ in 0..10 {
            let grad = ndarray::arr1(&[1.0, -1.0]);
            params_adamw[0].set_grad(grad.clone());
            params_adam[0].set_grad(grad);
            adamw.step(&mut params_adamw);
            adam.step(&mut params_adam);
        }

        assert!(params_adamw[0].data()[0].abs() < params_adam[0].data()[0].abs());
        assert!(params_adamw[0].data()[1].abs() < params_adam[0].data()[1].abs());
    }
}
