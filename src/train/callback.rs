//! Callback hooks for training lifecycle events
//!
//! Every [`TrainingState`] has a matching method on [`Callback`], all of them
//! defaulting to [`CallbackAction::Continue`]. A callback sees a read-only
//! snapshot of the trainer and can ask it to stop after the current epoch or
//! to write a checkpoint.
//!
//! ```rust
//! use bucle::train::{Callback, CallbackAction, CallbackContext};
//!
//! struct StopWhenConverged;
//!
//! impl Callback for StopWhenConverged {
//!     fn on_epoch_end(&mut self, ctx: &CallbackContext<'_>) -> CallbackAction {
//!         match ctx.name_to_metric("train_loss") {
//!             Ok(loss) if loss < 1e-3 => CallbackAction::Stop,
//!             _ => CallbackAction::Continue,
//!         }
//!     }
//! }
//! ```

use super::meter::name_to_metric;
use super::{Metrics, ModelState, TrainerState, TrainingState};
use crate::Result;
use std::path::PathBuf;

/// Snapshot handed to callbacks
#[derive(Debug, Clone)]
pub struct CallbackContext<'a> {
    pub event: TrainingState,
    pub model_state: ModelState,
    pub state: &'a TrainerState,
    pub metrics: &'a Metrics,
    /// Learning rate of the optimizer, once one is set
    pub lr: Option<f32>,
}

impl CallbackContext<'_> {
    /// Look up a metric such as `valid_loss` or `current_epoch`
    pub fn name_to_metric(&self, name: &str) -> Result<f32> {
        name_to_metric(self.metrics, self.state.current_epoch, name)
    }
}

/// What a callback asks the trainer to do
#[derive(Clone, Debug, PartialEq)]
pub enum CallbackAction {
    Continue,
    /// End the run once the current epoch completes
    Stop,
    /// Write a checkpoint now
    SaveCheckpoint { path: PathBuf, weights_only: bool },
}

/// Hooks for training events
pub trait Callback {
    fn on_train_start(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_end(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_epoch_start(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_epoch_end(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_epoch_start(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_epoch_end(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_valid_epoch_start(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_valid_epoch_end(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_step_start(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_step_end(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_valid_step_start(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_valid_step_end(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_test_step_start(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_test_step_end(&mut self, _ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Route an event to its hook
    fn handle(&mut self, ctx: &CallbackContext<'_>) -> CallbackAction {
        match ctx.event {
            TrainingState::TrainStart => self.on_train_start(ctx),
            TrainingState::TrainEnd => self.on_train_end(ctx),
            TrainingState::EpochStart => self.on_epoch_start(ctx),
            TrainingState::EpochEnd => self.on_epoch_end(ctx),
            TrainingState::TrainEpochStart => self.on_train_epoch_start(ctx),
            TrainingState::TrainEpochEnd => self.on_train_epoch_end(ctx),
            TrainingState::ValidEpochStart => self.on_valid_epoch_start(ctx),
            TrainingState::ValidEpochEnd => self.on_valid_epoch_end(ctx),
            TrainingState::TrainStepStart => self.on_train_step_start(ctx),
            TrainingState::TrainStepEnd => self.on_train_step_end(ctx),
            TrainingState::ValidStepStart => self.on_valid_step_start(ctx),
            TrainingState::ValidStepEnd => self.on_valid_step_end(ctx),
            TrainingState::TestStepStart => self.on_test_step_start(ctx),
            TrainingState::TestStepEnd => self.on_test_step_end(ctx),
        }
    }
}

/// Dispatches events to callbacks in registration order
#[derive(Default)]
pub struct CallbackRunner {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackRunner {
    pub fn new(callbacks: Vec<Box<dyn Callback>>) -> Self {
        Self { callbacks }
    }

    pub fn add<C: Callback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Run every callback for the event; returns the non-`Continue` actions
    pub fn dispatch(&mut self, ctx: &CallbackContext<'_>) -> Vec<CallbackAction> {
        self.callbacks
            .iter_mut()
            .map(|cb| cb.handle(ctx))
            .filter(|action| *action != CallbackAction::Continue)
            .collect()
    }
}

impl std::fmt::Debug for CallbackRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRunner")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
