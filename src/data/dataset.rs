//! Dataset trait

use super::Sample;
use crate::Result;

/// Random-access collection of samples
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the sample at `index`
    fn get(&self, index: usize) -> Result<Sample>;
}
