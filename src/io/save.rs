//! Checkpoint saving

use super::checkpoint::{SavedState, StateDict};
use super::format::CheckpointFormat;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::path::Path;

/// Write a checkpoint, picking the format from the file extension
///
/// ```no_run
/// use bucle::io::{save_checkpoint, SavedState, StateDict};
///
/// let mut weights = StateDict::new();
/// weights.insert("weight".to_string(), vec![1.0, 2.0]);
/// save_checkpoint(&SavedState::WeightsOnly(weights), "model.safetensors").unwrap();
/// ```
pub fn save_checkpoint(state: &SavedState, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = CheckpointFormat::from_path(path)?;

    if format != CheckpointFormat::SafeTensors {
        ensure_finite_weights(state.weights(), format)?;
    }

    let data = match format {
        CheckpointFormat::SafeTensors => return save_safetensors(state, path),
        CheckpointFormat::Json => serde_json::to_string_pretty(state)
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?,
        CheckpointFormat::Yaml => serde_yaml::to_string(state)
            .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?,
    };
    std::fs::write(path, data)?;

    tracing::debug!(path = %path.display(), ?format, "checkpoint written");
    Ok(())
}

/// Text formats have no spelling for NaN or infinity, so refuse to write them
fn ensure_finite_weights(weights: &StateDict, format: CheckpointFormat) -> Result<()> {
    for (name, values) in weights {
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::Serialization(format!(
                "parameter '{name}' holds {bad}, which {format:?} cannot represent; \
                 save to .safetensors instead"
            )));
        }
    }
    Ok(())
}

fn save_safetensors(state: &SavedState, path: &Path) -> Result<()> {
    let weights: &StateDict = state.weights();
    let views = weights
        .iter()
        .map(|(name, values)| {
            let bytes: &[u8] = bytemuck::cast_slice(values.as_slice());
            TensorView::new(Dtype::F32, vec![values.len()], bytes)
                .map(|view| (name.as_str(), view))
                .map_err(|e| Error::Serialization(format!("tensor '{name}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = HashMap::new();
    match state {
        SavedState::WeightsOnly(_) => {
            metadata.insert("format".to_string(), "weights_only".to_string());
        }
        SavedState::Full(checkpoint) => {
            metadata.insert("format".to_string(), "full".to_string());
            metadata.insert("epoch".to_string(), checkpoint.epoch.to_string());
            metadata.insert("fp16".to_string(), checkpoint.fp16.to_string());
            for (key, value) in [
                ("optimizer", &checkpoint.optimizer),
                ("scheduler", &checkpoint.scheduler),
            ] {
                if let Some(value) = value {
                    let encoded = serde_json::to_string(value).map_err(|e| {
                        Error::Serialization(format!("{key} state serialization failed: {e}"))
                    })?;
                    metadata.insert(key.to_string(), encoded);
                }
            }
        }
    }

    let bytes = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;
    std::fs::write(path, bytes)?;

    tracing::debug!(path = %path.display(), tensors = weights.len(), "safetensors checkpoint written");
    Ok(())
}
