//! Batching data loader with an optional worker pool

use super::{default_collate, Batch, CollateFn, Dataset, Sampler, Sample, SequentialSampler};
use crate::{Error, Result};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Worker count for a `n_jobs` setting; `-1` means all logical CPUs
pub fn resolve_workers(n_jobs: i64) -> Result<usize> {
    match n_jobs {
        -1 => Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)),
        n if n >= 0 => Ok(n as usize),
        n => Err(Error::ConfigError(format!(
            "n_jobs must be -1 or non-negative, got {n}"
        ))),
    }
}

/// Iterates a dataset in batches
///
/// With workers, the samples of each batch are fetched on a rayon pool in
/// parallel; collation always runs on the calling thread.
pub struct DataLoader<'a> {
    dataset: &'a dyn Dataset,
    batch_size: usize,
    sampler: Box<dyn Sampler>,
    collate: Option<CollateFn>,
    pool: Option<ThreadPool>,
}

impl<'a> DataLoader<'a> {
    pub fn new(dataset: &'a dyn Dataset, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::ConfigError("batch size must be > 0".to_string()));
        }
        Ok(Self {
            dataset,
            batch_size,
            sampler: Box::new(SequentialSampler::new(dataset.len())),
            collate: None,
            pool: None,
        })
    }

    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_collate(mut self, collate: CollateFn) -> Self {
        self.collate = Some(collate);
        self
    }

    /// Fetch samples on `workers` threads; 0 fetches inline
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        self.pool = if workers == 0 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("bucle-loader-{i}"))
                .build()
                .map_err(|e| Error::ConfigError(format!("failed to start loader workers: {e}")))?;
            Some(pool)
        };
        Ok(self)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.current_num_threads())
    }

    /// Number of batches per pass; the last one may be short
    pub fn len(&self) -> usize {
        self.sampler.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_epoch(&mut self, epoch: usize) {
        self.sampler.set_epoch(epoch);
    }

    /// Start a pass over the data
    pub fn iter(&mut self) -> Batches<'_, 'a> {
        let indices = self.sampler.indices();
        tracing::debug!(
            samples = indices.len(),
            batch_size = self.batch_size,
            workers = self.workers(),
            "starting data pass"
        );
        Batches {
            loader: self,
            indices,
            position: 0,
        }
    }

    /// Start a pass that owns the loader
    pub fn into_batches(mut self) -> IntoBatches<'a> {
        let indices = self.sampler.indices();
        IntoBatches {
            loader: self,
            indices,
            position: 0,
        }
    }

    /// Collate the batch starting at `*position` and advance past it
    fn next_batch(&self, indices: &[usize], position: &mut usize) -> Option<Result<Batch>> {
        if *position >= indices.len() {
            return None;
        }
        let end = (*position + self.batch_size).min(indices.len());
        let chunk = &indices[*position..end];
        *position = end;

        Some(self.fetch(chunk).and_then(|samples| self.collate(samples)))
    }

    fn remaining(&self, indices: &[usize], position: usize) -> usize {
        (indices.len() - position).div_ceil(self.batch_size)
    }

    fn fetch(&self, indices: &[usize]) -> Result<Vec<Sample>> {
        let dataset = self.dataset;
        match &self.pool {
            Some(pool) => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| dataset.get(i))
                    .collect::<Result<Vec<_>>>()
            }),
            None => indices.iter().map(|&i| dataset.get(i)).collect(),
        }
    }

    fn collate(&self, samples: Vec<Sample>) -> Result<Batch> {
        match &self.collate {
            Some(collate) => collate(samples),
            None => default_collate(samples),
        }
    }
}

/// One pass of batches from a [`DataLoader`]
pub struct Batches<'l, 'a> {
    loader: &'l DataLoader<'a>,
    indices: Vec<usize>,
    position: usize,
}

impl Iterator for Batches<'_, '_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch(&self.indices, &mut self.position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.loader.remaining(&self.indices, self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_, '_> {}

/// One pass of batches that owns its [`DataLoader`]
pub struct IntoBatches<'a> {
    loader: DataLoader<'a>,
    indices: Vec<usize>,
    position: usize,
}

impl Iterator for IntoBatches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch(&self.indices, &mut self.position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.loader.remaining(&self.indices, self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for IntoBatches<'_> {}
