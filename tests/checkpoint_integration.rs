//! Saving and resuming training through every checkpoint format

mod common;

use bucle::io::{load_checkpoint, CheckpointFormat, SavedState};
use bucle::optim::{Adam, StepLR};
use bucle::train::{FitOptions, Model, TrainArgs, Trainer};
use bucle::Error;
use common::{Linear, Plane};
use tempfile::TempDir;

fn args(epochs: usize) -> TrainArgs {
    TrainArgs::default()
        .with_epochs(epochs)
        .with_batch_sizes(3, 3)
        .with_shuffle(false)
        .with_progress(false)
}

fn trainer() -> Trainer<Linear> {
    Trainer::new(Linear::new())
        .with_optimizer(Box::new(Adam::default_params(0.05)))
        .with_scheduler(Box::new(StepLR::new(0.05, 1, 0.5)))
}

#[test]
fn test_resumed_run_matches_uninterrupted_run() {
    let data = Plane(9);

    let mut uninterrupted = trainer();
    uninterrupted.fit(&data, &args(2), FitOptions::new()).unwrap();

    for ext in ["json", "yaml", "safetensors"] {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("ckpt.{ext}"));

        let mut first = trainer();
        first.fit(&data, &args(1), FitOptions::new()).unwrap();
        first.save(&path, false).unwrap();

        let mut resumed = trainer();
        resumed.load(&path, false, "cpu").unwrap();
        assert_eq!(resumed.state().current_epoch, 1, "{ext}");
        resumed.fit(&data, &args(1), FitOptions::new()).unwrap();

        assert_eq!(
            resumed.model().state_dict(),
            uninterrupted.model().state_dict(),
            "{ext}"
        );
        assert_eq!(resumed.lr(), uninterrupted.lr(), "{ext}");
    }
}

#[test]
fn test_weights_only_files_hold_only_weights() {
    let dir = TempDir::new().unwrap();
    let data = Plane(6);
    let mut trained = trainer();
    trained.fit(&data, &args(1), FitOptions::new()).unwrap();

    for ext in ["json", "yaml", "safetensors"] {
        let path = dir.path().join(format!("weights.{ext}"));
        trained.save(&path, true).unwrap();
        assert_eq!(
            CheckpointFormat::from_path(&path).unwrap().extension(),
            ext
        );

        let saved = load_checkpoint(&path).unwrap();
        assert!(saved.is_weights_only(), "{ext}");
        assert_eq!(saved.weights(), &trained.model().state_dict());

        let mut fresh = trainer();
        fresh.load(&path, true, "cpu").unwrap();
        assert_eq!(fresh.model().state_dict(), trained.model().state_dict());
        assert_eq!(fresh.state().current_epoch, 0);
    }
}

#[test]
fn test_full_checkpoint_loads_as_weights() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("full.safetensors");
    let trained = trainer();
    trained.save(&path, false).unwrap();

    match load_checkpoint(&path).unwrap() {
        SavedState::Full(checkpoint) => {
            assert!(checkpoint.optimizer.is_some());
            assert!(checkpoint.scheduler.is_some());
            assert!(!checkpoint.fp16);
        }
        SavedState::WeightsOnly(_) => panic!("expected a full checkpoint"),
    }

    let mut fresh = Trainer::new(Linear::new());
    fresh.load(&path, true, "cpu").unwrap();
    assert_eq!(fresh.model().state_dict(), trained.model().state_dict());
}

#[test]
fn test_load_rejects_mismatched_model() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"linear.weight": [1.0, 2.0, 3.0], "linear.bias": [0.0]}"#).unwrap();

    let mut fresh = trainer();
    let err = fresh.load(&path, true, "cpu").unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }), "{err}");

    std::fs::write(&path, r#"{"linear.weight": [1.0, 2.0]}"#).unwrap();
    let err = fresh.load(&path, true, "cpu").unwrap_err();
    assert!(matches!(err, Error::MissingParameter(_)), "{err}");
}
