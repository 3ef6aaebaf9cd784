//! Adam optimizer

use super::{ensure_finite, from_state, to_state, Optimizer};
use crate::{Result, Tensor};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// First and second moment estimates shared by Adam and AdamW
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Moments {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<Array1<f32>>>,
    v: Vec<Option<Array1<f32>>>,
}

impl Moments {
    pub(super) fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Advance the timestep and return the bias-corrected learning rate
    pub(super) fn begin_step(&mut self, lr: f32, num_params: usize) -> f32 {
        if self.m.len() != num_params {
            self.m = vec![None; num_params];
            self.v = vec![None; num_params];
        }
        self.t += 1;
        let t = self.t as i32;
        lr * ((1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t)))
    }

    /// Fail if either moment estimate has gone NaN or infinite
    pub(super) fn ensure_finite(&self) -> Result<()> {
        ensure_finite("Adam moments", self.m.iter().chain(&self.v))
    }

    /// Update moments for parameter `i` and return `lr_t * m / (√v + ε)`
    pub(super) fn update(&mut self, i: usize, grad: &Array1<f32>, lr_t: f32) -> Array1<f32> {
        // m_t = β1 * m_{t-1} + (1 - β1) * g
        let m_t = match self.m[i].take() {
            Some(m) => m * self.beta1 + grad * (1.0 - self.beta1),
            None => grad * (1.0 - self.beta1),
        };
        // v_t = β2 * v_{t-1} + (1 - β2) * g²
        let grad_sq = grad * grad;
        let v_t = match self.v[i].take() {
            Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
            None => grad_sq * (1.0 - self.beta2),
        };

        let update = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
        self.m[i] = Some(m_t);
        self.v[i] = Some(v_t);
        update
    }
}

/// Adam optimizer (Adaptive Moment Estimation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    lr: f32,
    moments: Moments,
}

impl Adam {
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            moments: Moments::new(beta1, beta2, epsilon),
        }
    }

    /// Create Adam with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Tensor]) {
        let lr_t = self.moments.begin_step(self.lr, params.len());

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad() {
                // θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε)
                let update = self.moments.update(i, &grad, lr_t);
                *param.data_mut() -= &update;
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

    #[test]
    fn test_adam_quadratic_convergence() {
        // f(x) = x², ∇f = 2x
        let mut params = vec![Tensor::from_vec(vec![5.0, -3.0, 2.0], true)];
        let mut optimizer = Adam::default_params(0.1);

        for _ in 0..100 {
            let grad = params[0].data().mapv(|x| 2.0 * x);
            params[0].set_grad(grad);
            optimizer.step(&mut params);
        }

        for &val in params[0].data().iter() {
            assert!(val.abs() < 0.5, "Value {} did not converge", val);
        }
    }

    #[test]
    fn test_adam_first_step_magnitude_is_lr() {
        // Bias correction makes the first update ≈ lr * sign(g)
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        params[0].set_grad(ndarray::arr1(&[123.0]));
        let mut optimizer = Adam::default_params(0.01);

        optimizer.step(&mut params);

        assert!((params[0].data()[0] - 0.99).abs() < 1e-4);
    }

    #[test]
    fn test_adam_state_restores_timestep() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        let mut a = Adam::default_params(0.1);
        for _ in 0..3 {
            params[0].set_grad(ndarray::arr1(&[1.0]));
            a.step(&mut params);
        }

        let mut b = Adam::default_params(0.5);
        b.load_state_dict(&a.state_dict().unwrap()).unwrap();

        assert_eq!(b.lr(), 0.1);
        assert_eq!(b.moments.t, 3);
    }

    #[test]
    fn test_adam_state_rejects_non_finite_moments() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        let mut optimizer = Adam::default_params(0.1);
        params[0].set_grad(ndarray::arr1(&[f32::NAN]));
        optimizer.step(&mut params);

        assert!(matches!(
            optimizer.state_dict(),
            Err(crate::Error::Serialization(_))
        ));
    }

    #[test]
    fn test_adam_rejects_foreign_state() {
        let sgd_state = crate::optim::SGD::new(0.1, 0.0).state_dict().unwrap();
        let mut adam = Adam::default_params(0.1);
        assert!(adam.load_state_dict(&sgd_state).is_err());
    }
}
