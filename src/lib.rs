//! # Bucle: training-loop harness
//!
//! Bucle runs a user model through epochs of training and validation on a
//! small tape-based autograd engine, with gradient accumulation, emulated
//! mixed precision, gradient clipping, data-parallel execution over TCP,
//! lifecycle callbacks and checkpointing.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation, `no_grad` and `autocast` scopes
//! - **amp**: Dynamic loss scaling for fp16 training
//! - **optim**: Optimizers (SGD, Adam, AdamW), schedulers and gradient clipping
//! - **data**: Datasets, samplers, collation and the batching loader
//! - **distributed**: Process groups and launcher-environment rendezvous
//! - **io**: Checkpoint saving and loading (JSON, YAML, SafeTensors)
//! - **train**: Trainer, callbacks, metrics and configuration
//! - **cli**: Arguments of the `bucle` binary

pub mod amp;
pub mod autograd;
pub mod cli;
pub mod data;
pub mod device;
pub mod distributed;
pub mod io;
pub mod optim;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Tensor};
pub use device::Device;
pub use error::{Error, Result};
