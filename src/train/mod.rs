//! Training loop
//!
//! A [`Trainer`] owns a [`Model`], an optimizer and an optional scheduler, and
//! drives them through epochs with gradient accumulation, optional fp16 loss
//! scaling, gradient clipping and data-parallel gradient averaging. Lifecycle
//! events reach user [`Callback`]s, which can stop the run or request a
//! checkpoint.
//!
//! # Example
//!
//! ```no_run
//! use bucle::train::{FitOptions, Model, TrainArgs, Trainer};
//! use bucle::optim::SGD;
//!
//! # fn run<M: Model>(model: M, data: &dyn bucle::data::Dataset) -> bucle::Result<()> {
//! let args = TrainArgs::from_file("train.yaml")?;
//! let mut trainer = Trainer::new(model).with_optimizer(Box::new(SGD::new(0.01, 0.9)));
//! let report = trainer.fit(data, &args, FitOptions::new())?;
//! println!("epochs={} loss={:?}", report.epochs_run, report.train_loss);
//! # Ok(())
//! # }
//! ```

pub mod callback;
mod config;
mod loss;
mod meter;
mod model;
mod state;
mod trainer;

pub use callback::{Callback, CallbackAction, CallbackContext, CallbackRunner};
pub use config::{TrainArgs, ValidationError};
pub use loss::{LossFn, MSELoss};
pub use meter::{name_to_metric, AverageMeter, MetricMeters, Metrics};
pub use model::{Model, ModelOutput};
pub use state::{ModelState, TrainerState, TrainingState};
pub use trainer::{FitOptions, FitReport, PredictOptions, Predictions, SchedulerStep, Trainer};
