//! End-to-end tests of the training loop: event order, accumulation,
//! early stopping, callback-driven checkpoints and fp16.

mod common;

use bucle::io::load_checkpoint;
use bucle::optim::{grad_norm, SGD};
use bucle::train::{
    Callback, CallbackAction, CallbackContext, FitOptions, Model, ModelState, TrainArgs, Trainer,
    TrainingState,
};
use bucle::Error;
use common::{CountingOptimizer, Linear, Plane};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::TempDir;

fn quiet_args() -> TrainArgs {
    TrainArgs::default()
        .with_epochs(1)
        .with_shuffle(false)
        .with_progress(false)
}

struct Recorder {
    events: Rc<RefCell<Vec<TrainingState>>>,
}

impl Callback for Recorder {
    fn handle(&mut self, ctx: &CallbackContext<'_>) -> CallbackAction {
        self.events.borrow_mut().push(ctx.event);
        CallbackAction::Continue
    }
}

/// Stops once `epochs` epochs have finished
struct StopAfter {
    epochs: usize,
}

impl Callback for StopAfter {
    fn on_epoch_end(&mut self, ctx: &CallbackContext<'_>) -> CallbackAction {
        if ctx.state.current_epoch + 1 >= self.epochs {
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }
}

struct SaveEachEpoch {
    dir: PathBuf,
}

impl Callback for SaveEachEpoch {
    fn on_epoch_end(&mut self, ctx: &CallbackContext<'_>) -> CallbackAction {
        CallbackAction::SaveCheckpoint {
            path: self.dir.join(format!("epoch{}.json", ctx.state.current_epoch)),
            weights_only: false,
        }
    }
}

#[test]
fn test_event_order_for_one_epoch_with_validation() {
    let train = Plane(4);
    let valid = Plane(3);
    let events = Rc::new(RefCell::new(Vec::new()));

    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.1, 0.0)));
    trainer
        .fit(
            &train,
            &quiet_args().with_batch_sizes(2, 4),
            FitOptions::new()
                .with_valid_dataset(&valid)
                .with_callback(Recorder {
                    events: events.clone(),
                }),
        )
        .unwrap();

    use TrainingState::*;
    assert_eq!(
        *events.borrow(),
        vec![
            TrainStart,
            EpochStart,
            TrainEpochStart,
            TrainStepStart,
            TrainStepEnd,
            TrainStepStart,
            TrainStepEnd,
            TrainEpochEnd,
            ValidEpochStart,
            ValidStepStart,
            ValidStepEnd,
            ValidEpochEnd,
            EpochEnd,
            TrainEnd,
        ]
    );
}

#[test]
fn test_accumulation_steps_once_per_window_plus_tail() {
    let data = Plane(7);
    for (accumulation, expected) in [(1, 7), (2, 4), (3, 3), (7, 1), (10, 1)] {
        let steps = Rc::new(Cell::new(0));
        let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(CountingOptimizer {
            steps: steps.clone(),
        }));
        trainer
            .fit(
                &data,
                &quiet_args()
                    .with_batch_sizes(1, 1)
                    .with_accumulation_steps(accumulation),
                FitOptions::new(),
            )
            .unwrap();
        assert_eq!(steps.get(), expected, "accumulation_steps = {accumulation}");
    }
}

#[test]
fn test_callback_stop_ends_run_after_current_epoch() {
    let data = Plane(8);
    let events = Rc::new(RefCell::new(Vec::new()));

    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.1, 0.0)));
    let report = trainer
        .fit(
            &data,
            &quiet_args().with_epochs(10).with_batch_sizes(4, 4),
            FitOptions::new()
                .with_callback(StopAfter { epochs: 2 })
                .with_callback(Recorder {
                    events: events.clone(),
                }),
        )
        .unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.epochs_run, 2);
    assert_eq!(trainer.state().current_epoch, 1);
    assert_eq!(trainer.model_state(), ModelState::End);

    let events = events.borrow();
    let epoch_ends = events.iter().filter(|e| **e == TrainingState::EpochEnd).count();
    assert_eq!(epoch_ends, 2);
    assert_eq!(events.last(), Some(&TrainingState::TrainEnd));
}

#[test]
fn test_callback_can_request_checkpoints() {
    let dir = TempDir::new().unwrap();
    let data = Plane(6);

    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.1, 0.0)));
    trainer
        .fit(
            &data,
            &quiet_args().with_epochs(2).with_batch_sizes(3, 3),
            FitOptions::new().with_callback(SaveEachEpoch {
                dir: dir.path().to_path_buf(),
            }),
        )
        .unwrap();

    let first = load_checkpoint(dir.path().join("epoch0.json")).unwrap();
    let second = load_checkpoint(dir.path().join("epoch1.json")).unwrap();
    assert_eq!(first.as_checkpoint().unwrap().epoch, 0);
    assert_eq!(second.as_checkpoint().unwrap().epoch, 1);
    assert!(second.as_checkpoint().unwrap().optimizer.is_some());
    assert_ne!(first.weights(), second.weights());
}

#[test]
fn test_callbacks_see_metrics_and_lr() {
    struct Check {
        seen: Rc<RefCell<Vec<(f32, Option<f32>)>>>,
    }

    impl Callback for Check {
        fn on_valid_epoch_end(&mut self, ctx: &CallbackContext<'_>) -> CallbackAction {
            let loss = ctx.name_to_metric("valid_loss").unwrap();
            self.seen.borrow_mut().push((loss, ctx.lr));
            CallbackAction::Continue
        }
    }

    let data = Plane(5);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.25, 0.0)));
    let report = trainer
        .fit(
            &data,
            &quiet_args().with_epochs(2),
            FitOptions::new()
                .with_valid_dataset(&data)
                .with_callback(Check { seen: seen.clone() }),
        )
        .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].0, report.valid_loss.unwrap());
    assert_eq!(seen[1].1, Some(0.25));
    assert!(seen[1].0 < seen[0].0);
}

#[test]
fn test_gradient_clipping_bounds_the_update() {
    let data = Plane(14);
    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(1.0, 0.0)));
    let before: Vec<f32> = trainer.model().state_dict().into_values().flatten().collect();

    trainer
        .fit(
            &data,
            &quiet_args().with_batch_sizes(14, 14).with_grad_clip(0.01),
            FitOptions::new(),
        )
        .unwrap();

    let after: Vec<f32> = trainer.model().state_dict().into_values().flatten().collect();
    let moved: f32 = before
        .iter()
        .zip(&after)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f32>()
        .sqrt();
    assert!(moved <= 0.01 + 1e-5, "update norm {moved}");
    assert!(grad_norm(trainer.model().parameters()) <= 0.01 + 1e-5);
}

#[test]
fn test_fp16_training_stays_finite() {
    let data = Plane(16);
    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.2, 0.0)));
    let report = trainer
        .fit(
            &data,
            &quiet_args().with_epochs(20).with_batch_sizes(4, 4).with_fp16(true),
            FitOptions::new().with_valid_dataset(&data),
        )
        .unwrap();

    assert!(trainer.state().fp16);
    assert!(report.train_loss.unwrap().is_finite());
    assert!(report.valid_loss.unwrap() < 0.2, "valid loss {:?}", report.valid_loss);
}

#[test]
fn test_yaml_config_drives_the_run() {
    let yaml = "
epochs: 3
train_batch_size: 4
valid_batch_size: 8
train_shuffle: true
seed: 7
progress: false
";
    let args = TrainArgs::from_yaml_str(yaml).unwrap();
    let data = Plane(12);
    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.1, 0.0)));
    let report = trainer.fit(&data, &args, FitOptions::new()).unwrap();

    assert_eq!(report.epochs_run, 3);
    assert_eq!(trainer.state().current_train_step, 9);
}

#[test]
fn test_unsupported_devices_fail() {
    let data = Plane(4);
    for device in ["tpu", "cuda"] {
        let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.1, 0.0)));
        let err = trainer
            .fit(&data, &quiet_args().with_device(device), FitOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)), "{device}: {err}");
    }
}

#[test]
fn test_invalid_args_are_rejected_before_training() {
    let data = Plane(4);
    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.1, 0.0)));
    let err = trainer
        .fit(&data, &quiet_args().with_accumulation_steps(0), FitOptions::new())
        .unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
    assert_eq!(trainer.train_state(), None);
}

/// Three features per sample where the model expects two
struct Wide;

impl bucle::data::Dataset for Wide {
    fn len(&self) -> usize {
        4
    }

    fn get(&self, index: usize) -> bucle::Result<bucle::data::Sample> {
        let mut sample = bucle::data::Sample::new();
        sample.insert("x".to_string(), ndarray::arr1(&[index as f32, 0.0, 1.0]));
        sample.insert("y".to_string(), ndarray::arr1(&[0.0]));
        Ok(sample)
    }
}

#[test]
fn test_wrong_feature_width_is_a_shape_error() {
    let mut trainer = Trainer::new(Linear::new()).with_optimizer(Box::new(SGD::new(0.1, 0.0)));
    let err = trainer
        .fit(&Wide, &quiet_args().with_batch_sizes(2, 2), FitOptions::new())
        .unwrap_err();

    assert!(matches!(err, Error::ShapeMismatch { .. }), "{err}");
}
