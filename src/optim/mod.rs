//! Optimizers, learning rate schedulers and gradient clipping

mod adam;
mod adamw;
mod clip;
mod optimizer;
mod scheduler;
mod sgd;

pub use adam::Adam;
pub use adamw::AdamW;
pub use clip::{clip_grad_norm, grad_norm};
pub use optimizer::Optimizer;
pub use scheduler::{CosineAnnealingLR, LRScheduler, PlateauMode, ReduceLROnPlateau, StepLR};
pub use sgd::SGD;

use crate::{Error, Result};
use ndarray::Array1;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize optimizer or scheduler state for checkpoints
pub(crate) fn to_state<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::Serialization(format!("state serialization failed: {e}")))
}

/// Restore optimizer or scheduler state saved by [`to_state`]
pub(crate) fn from_state<T: DeserializeOwned>(state: &serde_json::Value) -> Result<T> {
    serde_json::from_value(state.clone())
        .map_err(|e| Error::Serialization(format!("state deserialization failed: {e}")))
}

/// JSON has no NaN or infinity, so state holding them would come back as null
pub(crate) fn ensure_finite<'a>(
    what: &str,
    buffers: impl IntoIterator<Item = &'a Option<Array1<f32>>>,
) -> Result<()> {
    if buffers.into_iter().flatten().any(|b| b.iter().any(|v| !v.is_finite())) {
        return Err(Error::Serialization(format!(
            "{what} holds non-finite values and cannot be checkpointed"
        )));
    }
    Ok(())
}
