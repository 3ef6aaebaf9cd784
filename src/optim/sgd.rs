//! Stochastic Gradient Descent optimizer

use super::{ensure_finite, from_state, to_state, Optimizer};
use crate::{Result, Tensor};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// SGD optimizer with optional momentum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SGD {
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<Array1<f32>>>,
}

impl SGD {
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocities: Vec::new(),
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [Tensor]) {
        if self.velocities.len() != params.len() {
            self.velocities = vec![None; params.len()];
        }

        for (param, velocity) in params.iter_mut().zip(self.velocities.iter_mut()) {
            let Some(grad) = param.grad() else {
                continue;
            };
            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let v = match velocity.take() {
                    Some(v) => v * self.momentum - &grad * self.lr,
                    None => grad * (-self.lr),
                };
                *param.data_mut() += &v;
                *velocity = Some(v);
            } else {
                *param.data_mut() -= &(grad * self.lr);
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
        ensure_finite("SGD velocity", &self.velocities)?;
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
    use ndarray::arr1;

    #[test]
    fn test_sgd_plain_step() {
        let mut params = vec![Tensor::from_vec(vec![1.0, -1.0], true)];
        params[0].set_grad(arr1(&[0.5, -0.5]));
        let mut opt = SGD::new(0.1, 0.0);

        opt.step(&mut params);

        assert_abs_diff_eq!(params[0].data()[0], 0.95, epsilon = 1e-6);
        assert_abs_diff_eq!(params[0].data()[1], -0.95, epsilon = 1e-6);
    }

    #[test]
    fn test_sgd_state_rejects_infinite_velocity() {
        let mut params = vec![Tensor::from_vec(vec![0.0], true)];
        let mut opt = SGD::new(1.0, 0.9);
        params[0].set_grad(arr1(&[f32::INFINITY]));
        opt.step(&mut params);

        assert!(matches!(opt.state_dict(), Err(crate::Error::Serialization(_))));
        assert!(SGD::new(1.0, 0.9).state_dict().is_ok());
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let mut params = vec![Tensor::from_vec(vec![0.0], true)];
        let mut opt = SGD::new(1.0, 0.5);

        params[0].set_grad(arr1(&[1.0]));
        opt.step(&mut params);
        assert_abs_diff_eq!(params[0].data()[0], -1.0, epsilon = 1e-6);

        // v = 0.5 * -1 - 1 = -1.5
        opt.step(&mut params);
        assert_abs_diff_eq!(params[0].data()[0], -2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_sgd_skips_params_without_grad() {
        let mut params = vec![Tensor::from_vec(vec![3.0], true)];
        let mut opt = SGD::new(0.1, 0.9);
        opt.step(&mut params);
        assert_eq!(params[0].data()[0], 3.0);
    }

    #[test]
    fn test_sgd_state_round_trip() {
        let mut params = vec![Tensor::from_vec(vec![0.0], true)];
        params[0].set_grad(arr1(&[1.0]));
        let mut opt = SGD::new(0.1, 0.9);
        opt.step(&mut params);

        let state = opt.state_dict().unwrap();
        let mut restored = SGD::new(1.0, 0.0);
        restored.load_state_dict(&state).unwrap();

        assert_eq!(restored.lr(), 0.1);
        assert_eq!(restored.velocities.len(), 1);
    }
}
