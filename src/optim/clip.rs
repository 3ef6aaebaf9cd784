//! Gradient norm clipping

use crate::Tensor;

/// Global L2 norm over all present gradients
pub fn grad_norm(params: &[Tensor]) -> f32 {
    params
        .iter()
        .filter_map(Tensor::grad)
        .map(|g| g.iter().map(|x| x * x).sum::<f32>())
        .sum::<f32>()
        .sqrt()
}

/// Rescale gradients so their global L2 norm is at most `max_norm`
///
/// Returns the norm measured before clipping.
///
/// # Example
///
/// ```
/// use bucle::optim::clip_grad_norm;
/// use bucle::Tensor;
///
/// let p = Tensor::from_vec(vec![0.0, 0.0], true);
/// p.set_grad(ndarray::arr1(&[3.0, 4.0]));
/// let mut params = vec![p];
///
/// let norm = clip_grad_norm(&mut params, 1.0);
/// assert!((norm - 5.0).abs() < 1e-6);
/// ```
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let total = grad_norm(params);
    let coef = max_norm / (total + 1e-6);
    if coef < 1.0 {
        for param in params.iter() {
            param.map_grad_inplace(|g| *g *= coef);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_clip_scales_to_max_norm() {
        let a = Tensor::from_vec(vec![0.0, 0.0], true);
        let b = Tensor::from_vec(vec![0.0], true);
        a.set_grad(arr1(&[3.0, 0.0]));
        b.set_grad(arr1(&[4.0]));
        let mut params = vec![a, b];

        clip_grad_norm(&mut params, 1.0);

        assert_abs_diff_eq!(grad_norm(&params), 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(params[0].grad().unwrap()[0], 0.6, epsilon = 1e-4);
    }

    #[test]
    fn test_clip_leaves_small_gradients() {
        let a = Tensor::from_vec(vec![0.0], true);
        a.set_grad(arr1(&[0.5]));
        let mut params = vec![a];

        let norm = clip_grad_norm(&mut params, 1.0);

        assert_abs_diff_eq!(norm, 0.5, epsilon = 1e-6);
        assert_eq!(params[0].grad().unwrap()[0], 0.5);
    }

    #[test]
    fn test_grad_norm_skips_missing_grads() {
        let a = Tensor::from_vec(vec![0.0], true);
        let b = Tensor::from_vec(vec![0.0], true);
        b.set_grad(arr1(&[2.0]));
        assert_abs_diff_eq!(grad_norm(&[a, b]), 2.0, epsilon = 1e-6);
    }
}
