//! The trait a trainable model implements

use crate::data::Batch;
use crate::io::StateDict;
use crate::optim::{LRScheduler, Optimizer};
use crate::{Error, Result, Tensor};
use ndarray::Array1;
use std::collections::BTreeMap;

/// What a forward pass hands back to the trainer
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub output: Tensor,
    /// Scalar loss; multi-element losses are averaged by the trainer
    pub loss: Tensor,
    /// Step metrics, averaged per epoch by sample count
    pub metrics: BTreeMap<String, f32>,
}

impl ModelOutput {
    pub fn new(output: Tensor, loss: Tensor) -> Self {
        Self {
            output,
            loss,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f32) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// A model the [`Trainer`](super::Trainer) can drive
///
/// Parameters live in a flat slice; `parameter_names` names them in the same
/// order. `forward` builds its graph on clones of the parameters, which share
/// their gradient cells with the originals.
pub trait Model {
    fn forward(&self, batch: &Batch) -> Result<ModelOutput>;

    fn parameters(&self) -> &[Tensor];

    fn parameters_mut(&mut self) -> &mut [Tensor];

    fn parameter_names(&self) -> Vec<String>;

    /// Switch between training and evaluation behavior
    fn set_training(&mut self, _training: bool) {}

    /// Optimizer used when none was given to the trainer
    fn fetch_optimizer(&self) -> Option<Box<dyn Optimizer>> {
        None
    }

    fn fetch_scheduler(&self) -> Option<Box<dyn LRScheduler>> {
        None
    }

    /// Turn a prediction batch's output into plain values
    fn process_output(&self, output: &Tensor) -> Vec<f32> {
        output.to_vec()
    }

    fn state_dict(&self) -> StateDict {
        self.parameter_names()
            .into_iter()
            .zip(self.parameters())
            .map(|(name, param)| (name, param.to_vec()))
            .collect()
    }

    /// Copy values into the parameters; every name must be present with a
    /// matching length and no extra names are allowed
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let names = self.parameter_names();
        if names.len() != self.parameters().len() {
            return Err(Error::InvalidParameter(format!(
                "model names {} parameters but has {}",
                names.len(),
                self.parameters().len()
            )));
        }
        if let Some(extra) = state.keys().find(|k| !names.contains(k)) {
            return Err(Error::InvalidParameter(format!(
                "unexpected parameter in state dict: {extra}"
            )));
        }

        // Check every entry before touching any parameter
        let mut checked = Vec::with_capacity(names.len());
        for (name, param) in names.iter().zip(self.parameters()) {
            let values = state
                .get(name)
                .ok_or_else(|| Error::MissingParameter(name.clone()))?;
            if values.len() != param.len() {
                return Err(Error::ShapeMismatch {
                    expected: vec![param.len()],
                    got: vec![values.len()],
                });
            }
            checked.push(values);
        }

        for (param, values) in self.parameters_mut().into_iter().zip(checked) {
            *param.data_mut() = Array1::from(values.clone());
        }
        Ok(())
    }
}
