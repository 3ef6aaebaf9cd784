//! Save/load tests across formats

use super::*;
use serde_json::json;
use tempfile::TempDir;

fn weights() -> StateDict {
    let mut weights = StateDict::new();
    weights.insert("linear.weight".to_string(), vec![1.0, -2.0, 3.5]);
    weights.insert("linear.bias".to_string(), vec![0.25]);
    weights
}

fn full_checkpoint() -> Checkpoint {
    Checkpoint {
        state_dict: weights(),
        optimizer: Some(json!({"lr": 0.01, "momentum": 0.9})),
        scheduler: None,
        epoch: 4,
        fp16: true,
    }
}

#[test]
fn test_full_checkpoint_in_every_format() {
    let dir = TempDir::new().unwrap();
    for ext in ["json", "yaml", "safetensors"] {
        let path = dir.path().join(format!("model.{ext}"));
        let state = SavedState::Full(full_checkpoint());

        save_checkpoint(&state, &path).unwrap();
        let loaded = load_checkpoint(&path).unwrap();

        assert_eq!(loaded, state, "format {ext}");
    }
}

#[test]
fn test_text_formats_refuse_non_finite_weights() {
    let dir = TempDir::new().unwrap();
    let mut weights = StateDict::new();
    weights.insert("w".to_string(), vec![f32::NAN, 1.0]);
    let state = SavedState::WeightsOnly(weights);

    for ext in ["json", "yaml"] {
        let path = dir.path().join(format!("model.{ext}"));
        let result = save_checkpoint(&state, &path);

        assert!(matches!(result, Err(crate::Error::Serialization(_))), "format {ext}");
        assert!(!path.exists(), "format {ext}");
    }
}

#[test]
fn test_safetensors_keeps_non_finite_weights() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.safetensors");
    let mut weights = StateDict::new();
    weights.insert("w".to_string(), vec![f32::NAN, f32::NEG_INFINITY, 1.0]);

    save_checkpoint(&SavedState::WeightsOnly(weights), &path).unwrap();
    let loaded = load_checkpoint(&path).unwrap();

    let w = &loaded.weights()["w"];
    assert!(w[0].is_nan());
    assert_eq!(w[1], f32::NEG_INFINITY);
    assert_eq!(w[2], 1.0);
}

#[test]
fn test_weights_only_holds_only_weights() {
    let dir = TempDir::new().unwrap();
    for ext in ["json", "yml", "safetensors"] {
        let path = dir.path().join(format!("weights.{ext}"));
        save_checkpoint(&SavedState::WeightsOnly(weights()), &path).unwrap();

        let loaded = load_checkpoint(&path).unwrap();
        assert!(loaded.is_weights_only(), "format {ext}");
        assert!(loaded.as_checkpoint().is_none());
        assert_eq!(loaded.into_weights(), weights());
    }
}

#[test]
fn test_json_layout_has_named_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    save_checkpoint(&SavedState::Full(full_checkpoint()), &path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["epoch"], json!(4));
    assert_eq!(raw["fp16"], json!(true));
    assert_eq!(raw["scheduler"], serde_json::Value::Null);
    assert_eq!(raw["state_dict"]["linear.bias"], json!([0.25]));
}

#[test]
fn test_safetensors_metadata_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.safetensors");
    save_checkpoint(&SavedState::Full(full_checkpoint()), &path).unwrap();

    let data = std::fs::read(&path).unwrap();
    let (_, header) = safetensors::SafeTensors::read_metadata(&data).unwrap();
    let metadata = header.metadata().clone().unwrap();

    assert_eq!(metadata["format"], "full");
    assert_eq!(metadata["epoch"], "4");
    assert_eq!(metadata["fp16"], "true");
    assert!(metadata.contains_key("optimizer"));
    assert!(!metadata.contains_key("scheduler"));
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.pt");

    let result = save_checkpoint(&SavedState::WeightsOnly(weights()), &path);
    assert!(matches!(result, Err(crate::Error::Serialization(_))));
    assert!(load_checkpoint(&path).is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = load_checkpoint(dir.path().join("absent.json"));
    assert!(matches!(result, Err(crate::Error::Io(_))));
}

#[test]
fn test_corrupt_json_is_serialization_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        load_checkpoint(&path),
        Err(crate::Error::Serialization(_))
    ));
}
