//! Index samplers

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Produces the order in which dataset indices are visited in one epoch
pub trait Sampler {
    /// Indices for the next pass over the data
    fn indices(&mut self) -> Vec<usize>;

    /// Number of indices one pass yields
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reseed for a new epoch
    fn set_epoch(&mut self, _epoch: usize) {}
}

/// `0..len` in order
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    len: usize,
}

impl SequentialSampler {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Sampler for SequentialSampler {
    fn indices(&mut self) -> Vec<usize> {
        (0..self.len).collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Seeded permutation, drawn fresh on every pass
#[derive(Debug, Clone)]
pub struct RandomSampler {
    len: usize,
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(len: usize, seed: u64) -> Self {
        Self {
            len,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn indices(&mut self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len).collect();
        indices.shuffle(&mut self.rng);
        indices
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Shards a dataset across `num_replicas` ranks
///
/// The index list is padded by wrapping around to a multiple of
/// `num_replicas`, so every rank sees the same number of samples. With
/// shuffling on, the permutation is derived from `seed + epoch` and is
/// therefore identical on every rank; call [`Sampler::set_epoch`] before each
/// epoch to get a new one.
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    dataset_len: usize,
    num_replicas: usize,
    rank: usize,
    shuffle: bool,
    seed: u64,
    epoch: usize,
}

impl DistributedSampler {
    pub fn new(dataset_len: usize, num_replicas: usize, rank: usize) -> Self {
        Self {
            dataset_len,
            num_replicas: num_replicas.max(1),
            rank,
            shuffle: false,
            seed: 0,
            epoch: 0,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    fn total_size(&self) -> usize {
        self.len() * self.num_replicas
    }
}

impl Sampler for DistributedSampler {
    fn indices(&mut self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset_len).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch as u64));
            indices.shuffle(&mut rng);
        }

        let n = indices.len();
        if n > 0 {
            let mut i = 0;
            while indices.len() < self.total_size() {
                let wrapped = indices[i % n];
                indices.push(wrapped);
                i += 1;
            }
        }

        indices
            .into_iter()
            .skip(self.rank)
            .step_by(self.num_replicas)
            .collect()
    }

    fn len(&self) -> usize {
        self.dataset_len.div_ceil(self.num_replicas)
    }

    fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }
}
