//! Collective communication trait

use crate::{Error, Result};

/// A set of cooperating ranks
///
/// Every collective blocks until all ranks have called it.
pub trait ProcessGroup {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Every rank's buffer, in rank order
    fn all_gather(&mut self, values: &[f32]) -> Result<Vec<Vec<f32>>>;

    /// Block until every rank arrives
    fn barrier(&mut self) -> Result<()> {
        self.all_gather(&[]).map(|_| ())
    }

    /// Replace `values` with the element-wise mean across ranks
    fn all_reduce_mean(&mut self, values: &mut [f32]) -> Result<()> {
        let gathered = self.all_gather(values)?;
        let world = gathered.len() as f32;
        for (rank, buffer) in gathered.iter().enumerate() {
            if buffer.len() != values.len() {
                return Err(Error::Distributed(format!(
                    "all_reduce length mismatch: rank {rank} sent {} values, expected {}",
                    buffer.len(),
                    values.len()
                )));
            }
        }
        for (i, value) in values.iter_mut().enumerate() {
            *value = gathered.iter().map(|buffer| buffer[i]).sum::<f32>() / world;
        }
        Ok(())
    }
}

/// Single-process group: every collective is the identity
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalGroup;

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_gather(&mut self, values: &[f32]) -> Result<Vec<Vec<f32>>> {
        Ok(vec![values.to_vec()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake group that answers with canned peer buffers
    struct Scripted {
        peers: Vec<Vec<f32>>,
    }

    impl ProcessGroup for Scripted {
        fn rank(&self) -> usize {
            0
        }

        fn world_size(&self) -> usize {
            self.peers.len() + 1
        }

        fn all_gather(&mut self, values: &[f32]) -> Result<Vec<Vec<f32>>> {
            let mut all = vec![values.to_vec()];
            all.extend(self.peers.iter().cloned());
            Ok(all)
        }
    }

    #[test]
    fn test_local_group_is_identity() {
        let mut group = LocalGroup;
        let mut values = vec![1.0, 2.0];
        group.all_reduce_mean(&mut values).unwrap();
        assert_eq!(values, vec![1.0, 2.0]);
        assert!(group.barrier().is_ok());
        assert_eq!(group.world_size(), 1);
    }

    #[test]
    fn test_all_reduce_mean_averages() {
        let mut group = Scripted {
            peers: vec![vec![3.0, 6.0], vec![5.0, 0.0]],
        };
        let mut values = vec![1.0, 0.0];
        group.all_reduce_mean(&mut values).unwrap();
        assert_eq!(values, vec![3.0, 2.0]);
    }

    #[test]
    fn test_all_reduce_length_mismatch() {
        let mut group = Scripted {
            peers: vec![vec![1.0]],
        };
        let mut values = vec![1.0, 2.0];
        assert!(matches!(
            group.all_reduce_mean(&mut values),
            Err(Error::Distributed(_))
        ));
    }
}
