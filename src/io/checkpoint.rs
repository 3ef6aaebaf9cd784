//! Checkpoint records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameter name to flat values
pub type StateDict = BTreeMap<String, Vec<f32>>;

/// Full training checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state_dict: StateDict,
    #[serde(default)]
    pub optimizer: Option<Value>,
    #[serde(default)]
    pub scheduler: Option<Value>,
    pub epoch: usize,
    pub fp16: bool,
}

/// What a checkpoint file holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavedState {
    Full(Checkpoint),
    WeightsOnly(StateDict),
}

impl SavedState {
    pub fn weights(&self) -> &StateDict {
        match self {
            SavedState::Full(checkpoint) => &checkpoint.state_dict,
            SavedState::WeightsOnly(weights) => weights,
        }
    }

    pub fn into_weights(self) -> StateDict {
        match self {
            SavedState::Full(checkpoint) => checkpoint.state_dict,
            SavedState::WeightsOnly(weights) => weights,
        }
    }

    pub fn is_weights_only(&self) -> bool {
        matches!(self, SavedState::WeightsOnly(_))
    }

    pub fn as_checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            SavedState::Full(checkpoint) => Some(checkpoint),
            SavedState::WeightsOnly(_) => None,
        }
    }
}
