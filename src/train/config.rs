//! Run arguments for `Trainer::fit`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Arguments of one training run
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```yaml
/// epochs: 5
/// train_batch_size: 64
/// accumulation_steps: 4
/// clip_grad_norm: 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainArgs {
    pub epochs: usize,
    pub train_batch_size: usize,
    pub valid_batch_size: usize,
    /// Data-loader workers; `-1` uses every logical CPU
    pub n_jobs: i64,
    /// `cpu`, `cuda`, `cuda:N` or `tpu`
    pub device: String,
    pub accumulation_steps: usize,
    /// Global gradient-norm limit applied before each optimizer step
    pub clip_grad_norm: Option<f32>,
    pub train_shuffle: bool,
    pub fp16: bool,
    /// Seed for shuffling samplers
    pub seed: u64,
    /// Draw progress bars; when off, step progress goes to the log instead
    pub progress: bool,
}

impl Default for TrainArgs {
    fn default() -> Self {
        Self {
            epochs: 20,
            train_batch_size: 32,
            valid_batch_size: 32,
            n_jobs: 0,
            device: "cpu".to_string(),
            accumulation_steps: 1,
            clip_grad_norm: None,
            train_shuffle: true,
            fp16: false,
            seed: 42,
            progress: true,
        }
    }
}

/// Out-of-range argument
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid batch size for {0}: must be > 0")]
    InvalidBatchSize(&'static str),

    #[error("Invalid accumulation steps: must be >= 1")]
    InvalidAccumulationSteps,

    #[error("Invalid n_jobs: {0} (must be -1 or >= 0)")]
    InvalidJobs(i64),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::ConfigError(format!("Invalid config: {e}"))
    }
}

impl TrainArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML or JSON file (picked by extension) and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let args = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };
        args.validate()?;
        Ok(args)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse JSON config: {e}")))
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.train_batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize("training"));
        }
        if self.valid_batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize("validation"));
        }
        if self.accumulation_steps == 0 {
            return Err(ValidationError::InvalidAccumulationSteps);
        }
        if self.n_jobs < -1 {
            return Err(ValidationError::InvalidJobs(self.n_jobs));
        }
        if let Some(clip) = self.clip_grad_norm {
            if clip.is_nan() || clip <= 0.0 {
                return Err(ValidationError::InvalidGradClip(clip));
            }
        }
        Ok(())
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_sizes(mut self, train: usize, valid: usize) -> Self {
        self.train_batch_size = train;
        self.valid_batch_size = valid;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: i64) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Sum gradients over `steps` batches per optimizer step
    pub fn with_accumulation_steps(mut self, steps: usize) -> Self {
        self.accumulation_steps = steps;
        self
    }

    pub fn with_grad_clip(mut self, max_norm: f32) -> Self {
        self.clip_grad_norm = Some(max_norm);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.train_shuffle = shuffle;
        self
    }

    pub fn with_fp16(mut self, fp16: bool) -> Self {
        self.fp16 = fp16;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}
