//! Checkpoint I/O
//!
//! A checkpoint is either a full training record (weights, optimizer and
//! scheduler state, epoch, fp16 flag) or just the weights. The file format is
//! picked from the extension: JSON, YAML or SafeTensors.

mod checkpoint;
mod format;
mod load;
mod save;

#[cfg(test)]
mod tests;

pub use checkpoint::{Checkpoint, SavedState, StateDict};
pub use format::CheckpointFormat;
pub use load::load_checkpoint;
pub use save::save_checkpoint;
