//! Samples, batches and collation

use crate::{Error, Result, Tensor};
use ndarray::Array1;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One dataset item: named flat arrays
pub type Sample = BTreeMap<String, Array1<f32>>;

/// Turns the samples of one batch into a [`Batch`]
pub type CollateFn = Arc<dyn Fn(Vec<Sample>) -> Result<Batch> + Send + Sync>;

/// Named tensors for one step, plus the number of samples they hold
#[derive(Debug, Clone, Default)]
pub struct Batch {
    fields: BTreeMap<String, Tensor>,
    size: usize,
}

impl Batch {
    pub fn new(size: usize) -> Self {
        Self {
            fields: BTreeMap::new(),
            size,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.fields.insert(name.into(), tensor);
    }

    /// Field by name; a missing field is a data error
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::InvalidParameter(format!("batch has no field '{name}'")))
    }

    /// Field holding one row of `cols` values per sample
    ///
    /// Checks the length before it reaches a panicking op such as
    /// [`crate::autograd::matmul`].
    pub fn get_matrix(&self, name: &str, cols: usize) -> Result<&Tensor> {
        let tensor = self.get(name)?;
        if tensor.len() != self.size * cols {
            return Err(Error::ShapeMismatch {
                expected: vec![self.size, cols],
                got: vec![tensor.len()],
            });
        }
        Ok(tensor)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Concatenate each field across samples
///
/// All samples must carry the same field names.
pub fn default_collate(samples: Vec<Sample>) -> Result<Batch> {
    let Some(first) = samples.first() else {
        return Err(Error::Collate("cannot collate an empty batch".to_string()));
    };
    let keys: Vec<String> = first.keys().cloned().collect();
    let size = samples.len();

    let mut columns: BTreeMap<String, Vec<f32>> =
        keys.iter().map(|k| (k.clone(), Vec::new())).collect();
    for (i, sample) in samples.into_iter().enumerate() {
        if sample.len() != keys.len() || !keys.iter().all(|k| sample.contains_key(k)) {
            return Err(Error::Collate(format!(
                "sample {i} has fields {:?}, expected {keys:?}",
                sample.keys().collect::<Vec<_>>()
            )));
        }
        for (key, values) in sample {
            if let Some(column) = columns.get_mut(&key) {
                column.extend(values.iter());
            }
        }
    }

    let mut batch = Batch::new(size);
    for (key, column) in columns {
        batch.insert(key, Tensor::from_vec(column, false));
    }
    Ok(batch)
}
