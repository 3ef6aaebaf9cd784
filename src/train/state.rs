//! Lifecycle states and trainer counters

use crate::device::Device;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse stage the model is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Train,
    Valid,
    Test,
    End,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Train => "train",
            ModelState::Valid => "valid",
            ModelState::Test => "test",
            ModelState::End => "end",
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained lifecycle events; each one is dispatched to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    TrainStart,
    TrainEnd,
    EpochStart,
    EpochEnd,
    TrainEpochStart,
    TrainEpochEnd,
    ValidEpochStart,
    ValidEpochEnd,
    TrainStepStart,
    TrainStepEnd,
    ValidStepStart,
    ValidStepEnd,
    TestStepStart,
    TestStepEnd,
}

impl TrainingState {
    pub const ALL: [TrainingState; 14] = [
        TrainingState::TrainStart,
        TrainingState::TrainEnd,
        TrainingState::EpochStart,
        TrainingState::EpochEnd,
        TrainingState::TrainEpochStart,
        TrainingState::TrainEpochEnd,
        TrainingState::ValidEpochStart,
        TrainingState::ValidEpochEnd,
        TrainingState::TrainStepStart,
        TrainingState::TrainStepEnd,
        TrainingState::ValidStepStart,
        TrainingState::ValidStepEnd,
        TrainingState::TestStepStart,
        TrainingState::TestStepEnd,
    ];

    /// Name of the callback hook this event triggers
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingState::TrainStart => "on_train_start",
            TrainingState::TrainEnd => "on_train_end",
            TrainingState::EpochStart => "on_epoch_start",
            TrainingState::EpochEnd => "on_epoch_end",
            TrainingState::TrainEpochStart => "on_train_epoch_start",
            TrainingState::TrainEpochEnd => "on_train_epoch_end",
            TrainingState::ValidEpochStart => "on_valid_epoch_start",
            TrainingState::ValidEpochEnd => "on_valid_epoch_end",
            TrainingState::TrainStepStart => "on_train_step_start",
            TrainingState::TrainStepEnd => "on_train_step_end",
            TrainingState::ValidStepStart => "on_valid_step_start",
            TrainingState::ValidStepEnd => "on_valid_step_end",
            TrainingState::TestStepStart => "on_test_step_start",
            TrainingState::TestStepEnd => "on_test_step_end",
        }
    }
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters and run settings owned by the trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub current_epoch: usize,
    pub current_train_step: usize,
    pub current_valid_step: usize,
    /// Index of the batch being processed within the current train epoch
    pub batch_index: usize,
    pub device: Device,
    pub fp16: bool,
    pub accumulation_steps: usize,
    pub clip_grad_norm: Option<f32>,
    /// `-1` when not running distributed
    pub local_rank: i64,
}

impl Default for TrainerState {
    fn default() -> Self {
        Self {
            current_epoch: 0,
            current_train_step: 0,
            current_valid_step: 0,
            batch_index: 0,
            device: Device::Cpu,
            fp16: false,
            accumulation_steps: 1,
            clip_grad_norm: None,
            local_rank: -1,
        }
    }
}

impl TrainerState {
    pub fn is_distributed(&self) -> bool {
        self.local_rank != -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_model_state_strings() {
        assert_eq!(ModelState::Train.as_str(), "train");
        assert_eq!(ModelState::End.to_string(), "end");
        assert_eq!(serde_json::to_string(&ModelState::Valid).unwrap(), "\"valid\"");
    }

    #[test]
    fn test_training_state_names_are_unique() {
        let names: HashSet<_> = TrainingState::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names.len(), 14);
        assert_eq!(TrainingState::ValidStepEnd.to_string(), "on_valid_step_end");
    }

    #[test]
    fn test_default_state_is_local() {
        let state = TrainerState::default();
        assert!(!state.is_distributed());
        assert_eq!(state.accumulation_steps, 1);
    }
}
