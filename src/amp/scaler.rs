//! Dynamic loss scaling

use super::fits_half;
use crate::Tensor;
use serde::{Deserialize, Serialize};

/// Dynamic loss scaler for mixed precision training
///
/// The loss is multiplied by [`scale`](Self::scale) before backward. Before the
/// optimizer step, [`unscale`](Self::unscale) divides gradients back and reports
/// whether any scaled gradient overflowed half precision; such steps are skipped
/// and the scale backs off. After `growth_interval` clean steps the scale grows.
///
/// # Example
///
/// ```
/// use bucle::amp::GradScaler;
///
/// let mut scaler = GradScaler::new();
/// assert_eq!(scaler.scale(), 65536.0);
/// scaler.update(true);
/// assert_eq!(scaler.scale(), 32768.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: usize,
    growth_tracker: usize,
}

impl GradScaler {
    pub fn new() -> Self {
        Self {
            scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
            growth_tracker: 0,
        }
    }

    pub fn with_init_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.growth_interval = interval.max(1);
        self
    }

    /// Current loss multiplier
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Divide gradients by the scale in place
    ///
    /// Returns `true` if any scaled gradient was non-finite or out of `f16`
    /// range. Gradients are unscaled either way; callers skip the step on overflow.
    pub fn unscale(&self, params: &[Tensor]) -> bool {
        let inv_scale = 1.0 / self.scale;
        let mut found_inf = false;
        for param in params {
            param.map_grad_inplace(|g| {
                if !fits_half(*g) {
                    found_inf = true;
                }
                *g *= inv_scale;
            });
        }
        found_inf
    }

    /// Adjust the scale after a step
    pub fn update(&mut self, found_inf: bool) {
        if found_inf {
            self.scale *= self.backoff_factor;
            self.growth_tracker = 0;
            tracing::warn!(scale = self.scale, "gradient overflow, loss scale reduced");
        } else {
            self.growth_tracker += 1;
            if self.growth_tracker >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.growth_tracker = 0;
                tracing::debug!(scale = self.scale, "loss scale increased");
            }
        }
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new()
    }
}
