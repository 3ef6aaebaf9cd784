//! Running averages and per-stage metric tables

use super::ModelState;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sample-weighted running average
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageMeter {
    pub val: f32,
    pub sum: f32,
    pub count: usize,
    pub avg: f32,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `val` observed over `n` samples
    pub fn update(&mut self, val: f32, n: usize) {
        self.val = val;
        self.sum += val * n as f32;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f32;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One meter per metric name reported by the model
#[derive(Debug, Clone, Default)]
pub struct MetricMeters {
    meters: BTreeMap<String, AverageMeter>,
}

impl MetricMeters {
    /// Fold in one step's metrics and return the current averages
    pub fn update(&mut self, values: &BTreeMap<String, f32>, n: usize) -> BTreeMap<String, f32> {
        for (name, value) in values {
            self.meters.entry(name.clone()).or_default().update(*value, n);
        }
        self.averages()
    }

    pub fn averages(&self) -> BTreeMap<String, f32> {
        self.meters
            .iter()
            .map(|(name, meter)| (name.clone(), meter.avg))
            .collect()
    }
}

/// Epoch averages for the train, valid and test stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub train: BTreeMap<String, f32>,
    pub valid: BTreeMap<String, f32>,
    pub test: BTreeMap<String, f32>,
}

impl Metrics {
    pub fn stage(&self, state: ModelState) -> Option<&BTreeMap<String, f32>> {
        match state {
            ModelState::Train => Some(&self.train),
            ModelState::Valid => Some(&self.valid),
            ModelState::Test => Some(&self.test),
            ModelState::End => None,
        }
    }

    fn stage_mut(&mut self, state: ModelState) -> Option<&mut BTreeMap<String, f32>> {
        match state {
            ModelState::Train => Some(&mut self.train),
            ModelState::Valid => Some(&mut self.valid),
            ModelState::Test => Some(&mut self.test),
            ModelState::End => None,
        }
    }

    /// Merge an epoch's metric averages and its loss into a stage
    pub fn update(&mut self, state: ModelState, monitor: BTreeMap<String, f32>, loss: f32) {
        if let Some(stage) = self.stage_mut(state) {
            stage.extend(monitor);
            stage.insert("loss".to_string(), loss);
        }
    }
}

/// Resolve names like `valid_loss` or `current_epoch`
///
/// The part before the first `_` picks the stage, the rest is the metric key.
pub fn name_to_metric(metrics: &Metrics, current_epoch: usize, name: &str) -> Result<f32> {
    if name == "current_epoch" {
        return Ok(current_epoch as f32);
    }
    let (stage, key) = name.split_once('_').unwrap_or((name, ""));
    let table = match stage {
        "train" => &metrics.train,
        "valid" => &metrics.valid,
        "test" => &metrics.test,
        _ => return Err(Error::UnknownMetric(name.to_string())),
    };
    table
        .get(key)
        .copied()
        .ok_or_else(|| Error::UnknownMetric(name.to_string()))
}
