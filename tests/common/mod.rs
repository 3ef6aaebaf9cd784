//! Shared fixtures: a two-feature linear regression problem

#![allow(dead_code)]

use bucle::autograd::{add_bias, matmul};
use bucle::data::{Batch, Dataset, Sample};
use bucle::optim::Optimizer;
use bucle::train::{LossFn, MSELoss, Model, ModelOutput};
use bucle::{Result, Tensor};
use ndarray::arr1;

/// y = 2 x0 - x1 + 0.5
pub struct Plane(pub usize);

impl Dataset for Plane {
    fn len(&self) -> usize {
        self.0
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let x0 = (index % 7) as f32 / 7.0;
        let x1 = (index % 5) as f32 / 5.0;
        let mut sample = Sample::new();
        sample.insert("x".to_string(), arr1(&[x0, x1]));
        sample.insert("y".to_string(), arr1(&[2.0 * x0 - x1 + 0.5]));
        Ok(sample)
    }
}

pub struct Linear {
    params: Vec<Tensor>,
}

impl Linear {
    pub fn new() -> Self {
        Self {
            params: vec![
                Tensor::from_vec(vec![0.1, -0.2], true),
                Tensor::zeros(1, true),
            ],
        }
    }
}

impl Model for Linear {
    fn forward(&self, batch: &Batch) -> Result<ModelOutput> {
        let x = batch.get_matrix("x", 2)?;
        let y = batch.get_matrix("y", 1)?;
        let rows = batch.len();
        let pred = add_bias(&matmul(x, &self.params[0], rows, 2, 1), &self.params[1]);
        let loss = MSELoss.forward(&pred, y)?;
        Ok(ModelOutput::new(pred, loss))
    }

    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["linear.weight".to_string(), "linear.bias".to_string()]
    }
}

/// Counts steps and otherwise does nothing
pub struct CountingOptimizer {
    pub steps: std::rc::Rc<std::cell::Cell<usize>>,
}

impl Optimizer for CountingOptimizer {
    fn step(&mut self, _params: &mut [Tensor]) {
        self.steps.set(self.steps.get() + 1);
    }

    fn lr(&self) -> f32 {
        0.0
    }

    fn set_lr(&mut self, _lr: f32) {}

    fn state_dict(&self) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    fn load_state_dict(&mut self, _state: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}
