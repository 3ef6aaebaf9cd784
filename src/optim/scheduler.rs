//! Learning rate schedulers

use super::{from_state, to_state, Optimizer};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler (after each epoch or batch)
    fn step(&mut self);

    /// Step with a monitored metric value
    ///
    /// Schedules that ignore metrics fall back to [`step`](Self::step).
    fn step_with_metric(&mut self, _metric: f32) {
        self.step();
    }

    /// Push the current learning rate into an optimizer
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }

    fn state_dict(&self) -> Result<serde_json::Value>;

    fn load_state_dict(&mut self, state: &serde_json::Value) -> Result<()>;
}

/// Cosine Annealing Learning Rate Scheduler
///
/// lr_t = lr_min + 0.5 * (lr_max - lr_min) * (1 + cos(π * t / T))
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosineAnnealingLR {
    lr_max: f32,
    lr_min: f32,
    t_max: usize,
    current_step: usize,
}

impl CosineAnnealingLR {
    pub fn new(lr_max: f32, t_max: usize, lr_min: f32) -> Self {
        Self {
            lr_max,
            lr_min,
            t_max,
            current_step: 0,
        }
    }

    /// Create scheduler with lr_min = 0
    pub fn default_min(lr_max: f32, t_max: usize) -> Self {
        Self::new(lr_max, t_max, 0.0)
    }
}

impl LRScheduler for CosineAnnealingLR {
    fn get_lr(&self) -> f32 {
        if self.current_step >= self.t_max {
            return self.lr_min;
        }

        let progress = self.current_step as f32 / self.t_max as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.lr_min + (self.lr_max - self.lr_min) * cosine_decay
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn state_dict(&self) -> Result<serde_json::Value> {
        to_state(self)
    }

    fn load_state_dict(&mut self, state: &serde_json::Value) -> Result<()> {
        *self = from_state(state)?;
        Ok(())
    }
}

/// Decays the learning rate by `gamma` every `step_size` steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLR {
    base_lr: f32,
    step_size: usize,
    gamma: f32,
    current_step: usize,
}

impl StepLR {
    pub fn new(base_lr: f32, step_size: usize, gamma: f32) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            current_step: 0,
        }
    }
}

impl LRScheduler for StepLR {
    fn get_lr(&self) -> f32 {
        let decays = (self.current_step / self.step_size) as i32;
        self.base_lr * self.gamma.powi(decays)
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn state_dict(&self) -> Result<serde_json::Value> {
        to_state(self)
    }

    fn load_state_dict(&mut self, state: &serde_json::Value) -> Result<()> {
        *self = from_state(state)?;
        Ok(())
    }
}

/// Direction in which the monitored metric improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateauMode {
    Min,
    Max,
}

/// Reduce the learning rate when a monitored metric stops improving
///
/// A value counts as an improvement when it beats the best seen so far by a
/// relative `threshold`. After `patience` steps without improvement the rate is
/// multiplied by `factor` (never below `min_lr`), then `cooldown` steps pass
/// before bad steps are counted again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceLROnPlateau {
    lr: f32,
    mode: PlateauMode,
    factor: f32,
    patience: usize,
    threshold: f32,
    cooldown: usize,
    min_lr: f32,
    best: Option<f32>,
    num_bad_steps: usize,
    cooldown_counter: usize,
}

impl ReduceLROnPlateau {
    pub fn new(lr: f32, mode: PlateauMode) -> Self {
        Self {
            lr,
            mode,
            factor: 0.1,
            patience: 10,
            threshold: 1e-4,
            cooldown: 0,
            min_lr: 0.0,
            best: None,
            num_bad_steps: 0,
            cooldown_counter: 0,
        }
    }

    pub fn with_factor(mut self, factor: f32) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self
    }

    fn is_better(&self, value: f32, best: f32) -> bool {
        match self.mode {
            PlateauMode::Min => value < best * (1.0 - self.threshold),
            PlateauMode::Max => value > best * (1.0 + self.threshold),
        }
    }
}

impl LRScheduler for ReduceLROnPlateau {
    fn get_lr(&self) -> f32 {
        self.lr
    }

    /// Without a metric there is nothing to monitor
    fn step(&mut self) {}

    fn step_with_metric(&mut self, metric: f32) {
        match self.best {
            Some(best) if !self.is_better(metric, best) => self.num_bad_steps += 1,
            _ => {
                self.best = Some(metric);
                self.num_bad_steps = 0;
            }
        }

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_steps = 0;
        }

        if self.num_bad_steps > self.patience {
            let reduced = (self.lr * self.factor).max(self.min_lr);
            if reduced < self.lr {
                tracing::info!(from = self.lr, to = reduced, "reducing learning rate on plateau");
                self.lr = reduced;
            }
            self.cooldown_counter = self.cooldown;
            self.num_bad_steps = 0;
        }
    }

    fn state_dict(&self) -> Result<serde_json::Value> {
        to_state(self)
    }

    fn load_state_dict(&mut self, state: &serde_json::Value) -> Result<()> {
        *self = from_state(state)?;
        Ok(())
    }
}
