//! Mixed precision support
//!
//! The engine keeps `f32` master weights and gradients. Reduced precision is
//! emulated by rounding forward activations through IEEE half precision (see
//! [`crate::autograd::autocast`]), and gradients are protected from underflow by
//! dynamic loss scaling with [`GradScaler`].

mod scaler;

pub use scaler::GradScaler;

use half::f16;
use ndarray::Array1;

/// Round every element through `f16`
pub fn round_to_half(data: Array1<f32>) -> Array1<f32> {
    data.mapv_into(|x| f16::from_f32(x).to_f32())
}

/// Whether a value survives storage in `f16` without overflowing
pub fn fits_half(value: f32) -> bool {
    f16::from_f32(value).is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_half_loses_precision() {
        let rounded = round_to_half(ndarray::arr1(&[1.0, 0.1, 1.0e-8]));
        assert_eq!(rounded[0], 1.0);
        assert_ne!(rounded[1], 0.1);
        assert!((rounded[1] - 0.1).abs() < 1e-3);
        // Below the smallest f16 subnormal
        assert_eq!(rounded[2], 0.0);
    }

    #[test]
    fn test_fits_half() {
        assert!(fits_half(65504.0));
        assert!(!fits_half(1.0e6));
        assert!(!fits_half(f32::NAN));
        assert!(!fits_half(f32::INFINITY));
    }
}
