//! Checkpoint loading

use super::checkpoint::{Checkpoint, SavedState, StateDict};
use super::format::CheckpointFormat;
use crate::{Error, Result};
use safetensors::tensor::Dtype;
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;

/// Read a checkpoint, picking the format from the file extension
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<SavedState> {
    let path = path.as_ref();
    let format = CheckpointFormat::from_path(path)?;

    let state = match format {
        CheckpointFormat::SafeTensors => return load_safetensors(path),
        CheckpointFormat::Json => serde_json::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?,
        CheckpointFormat::Yaml => serde_yaml::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?,
    };
    Ok(state)
}

fn load_safetensors(path: &Path) -> Result<SavedState> {
    let data = std::fs::read(path)?;

    let (_, header) = SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;
    let metadata: HashMap<String, String> = header.metadata().clone().unwrap_or_default();

    let tensors = SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut weights = StateDict::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(Error::Serialization(format!(
                "tensor '{name}' has dtype {:?}, expected F32",
                view.dtype()
            )));
        }
        // Tensor data inside the file is not guaranteed to be 4-byte aligned
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        weights.insert(name, values);
    }

    if metadata.get("format").map(String::as_str) != Some("full") {
        return Ok(SavedState::WeightsOnly(weights));
    }

    let epoch = parse_field(&metadata, "epoch")?.unwrap_or(0);
    let fp16 = parse_field(&metadata, "fp16")?.unwrap_or(false);
    let optimizer = json_field(&metadata, "optimizer")?;
    let scheduler = json_field(&metadata, "scheduler")?;

    Ok(SavedState::Full(Checkpoint {
        state_dict: weights,
        optimizer,
        scheduler,
        epoch,
        fp16,
    }))
}

fn parse_field<T: std::str::FromStr>(
    metadata: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>> {
    metadata
        .get(key)
        .map(|raw| {
            raw.parse()
                .map_err(|_| Error::Serialization(format!("invalid '{key}' metadata: {raw}")))
        })
        .transpose()
}

fn json_field(metadata: &HashMap<String, String>, key: &str) -> Result<Option<serde_json::Value>> {
    metadata
        .get(key)
        .map(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| Error::Serialization(format!("invalid '{key}' metadata: {e}")))
        })
        .transpose()
}
