//! Datasets, samplers and batching
//!
//! Datasets hand out [`Sample`]s (named `f32` arrays) and are shared with the
//! loader's worker threads, so they must be `Send + Sync`. Collation into a
//! [`Batch`] of autograd tensors happens on the training thread.

mod batch;
mod dataset;
mod loader;
mod sampler;

pub use batch::{default_collate, Batch, CollateFn, Sample};
pub use dataset::Dataset;
pub use loader::{resolve_workers, Batches, DataLoader, IntoBatches};
pub use sampler::{DistributedSampler, RandomSampler, Sampler, SequentialSampler};
