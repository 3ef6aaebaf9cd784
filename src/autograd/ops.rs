//! Autograd operations with backward passes

use super::tensor::GradCell;
use super::{autocast_enabled, grad_enabled, BackwardOp, Tensor};
use crate::amp::round_to_half;
use ndarray::Array1;
use std::rc::Rc;

/// Build an op result, applying autocast rounding and the grad-mode switch
///
/// Returns the tensor and whether a backward op should be attached.
fn op_result(data: Array1<f32>, inputs_require_grad: bool) -> (Tensor, bool) {
    let data = if autocast_enabled() {
        round_to_half(data)
    } else {
        data
    };
    let record = inputs_require_grad && grad_enabled();
    (Tensor::new(data, record), record)
}

/// Accumulate an input's share of the output gradient
fn propagate(input: &Tensor, grad: Array1<f32>) {
    if input.requires_grad() {
        input.accumulate_grad(grad);
    }
}

/// Add two tensors
///
/// # Panics
///
/// Panics if `a` and `b` differ in length.
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "add: operand lengths differ");
    let (mut result, record) = op_result(a.data() + b.data(), a.requires_grad() || b.requires_grad());

    if record {
        result.set_backward_op(Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            negate_b: false,
            result_grad: result.grad_cell(),
        }));
    }

    result
}

/// Subtract `b` from `a`
///
/// # Panics
///
/// Panics if `a` and `b` differ in length.
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "sub: operand lengths differ");
    let (mut result, record) = op_result(a.data() - b.data(), a.requires_grad() || b.requires_grad());

    if record {
        result.set_backward_op(Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            negate_b: true,
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    negate_b: bool,
    result_grad: GradCell,
}

impl BackwardOp for AddBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a, &self.b]
    }

    fn backward(&self) {
        let Some(grad) = self.result_grad.borrow().clone() else {
            return;
        };
        let grad_b = if self.negate_b { -&grad } else { grad.clone() };
        propagate(&self.a, grad);
        propagate(&self.b, grad_b);
    }
}

/// Multiply two tensors element-wise
///
/// # Panics
///
/// Panics if `a` and `b` differ in length.
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "mul: operand lengths differ");
    let (mut result, record) = op_result(a.data() * b.data(), a.requires_grad() || b.requires_grad());

    if record {
        result.set_backward_op(Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for MulBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a, &self.b]
    }

    fn backward(&self) {
        let Some(grad) = self.result_grad.borrow().clone() else {
            return;
        };
        // ∂L/∂a = ∂L/∂out * b, ∂L/∂b = ∂L/∂out * a
        propagate(&self.a, &grad * self.b.data());
        propagate(&self.b, &grad * self.a.data());
    }
}

/// Scale tensor by a scalar
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let (mut result, record) = op_result(a.data() * factor, a.requires_grad());

    if record {
        result.set_backward_op(Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for ScaleBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        let Some(grad) = self.result_grad.borrow().clone() else {
            return;
        };
        propagate(&self.a, grad * self.factor);
    }
}

/// Add a bias vector repeated across rows
///
/// `a` is a row-major `rows × bias.len()` matrix flattened to one dimension.
///
/// # Panics
///
/// Panics if `bias` is empty or `a.len()` is not a multiple of `bias.len()`.
pub fn add_bias(a: &Tensor, bias: &Tensor) -> Tensor {
    assert!(
        !bias.is_empty() && a.len() % bias.len() == 0,
        "add_bias: input length {} is not a multiple of bias length {}",
        a.len(),
        bias.len()
    );
    let width = bias.len();
    let mut data = a.data().clone();
    for (i, x) in data.iter_mut().enumerate() {
        *x += bias.data()[i % width];
    }
    let (mut result, record) = op_result(data, a.requires_grad() || bias.requires_grad());

    if record {
        result.set_backward_op(Rc::new(AddBiasBackward {
            a: a.clone(),
            bias: bias.clone(),
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct AddBiasBackward {
    a: Tensor,
    bias: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for AddBiasBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a, &self.bias]
    }

    fn backward(&self) {
        let Some(grad) = self.result_grad.borrow().clone() else {
            return;
        };
        let width = self.bias.len();
        let mut grad_bias = Array1::zeros(width);
        for (i, g) in grad.iter().enumerate() {
            grad_bias[i % width] += g;
        }
        propagate(&self.a, grad);
        propagate(&self.bias, grad_bias);
    }
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let (mut result, record) = op_result(a.data().mapv(|x| x.max(0.0)), a.requires_grad());

    if record {
        result.set_backward_op(Rc::new(ReluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for ReluBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        let Some(grad) = self.result_grad.borrow().clone() else {
            return;
        };
        // ∂L/∂a = ∂L/∂out * (a > 0)
        let mask = self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
        propagate(&self.a, grad * &mask);
    }
}

/// Sum all elements
pub fn sum(a: &Tensor) -> Tensor {
    reduce(a, 1.0)
}

/// Mean of all elements
pub fn mean(a: &Tensor) -> Tensor {
    let n = a.len().max(1) as f32;
    reduce(a, 1.0 / n)
}

fn reduce(a: &Tensor, weight: f32) -> Tensor {
    let (mut result, record) = op_result(Array1::from(vec![a.data().sum() * weight]), a.requires_grad());

    if record {
        result.set_backward_op(Rc::new(ReduceBackward {
            a: a.clone(),
            weight,
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct ReduceBackward {
    a: Tensor,
    weight: f32,
    result_grad: GradCell,
}

impl BackwardOp for ReduceBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        let Some(grad) = self.result_grad.borrow().clone() else {
            return;
        };
        let grad_val = grad[0] * self.weight;
        propagate(&self.a, Array1::from_elem(self.a.len(), grad_val));
    }
}

/// Matrix multiplication
///
/// Computes C = A @ B where:
/// - A is m×k (flattened to length m*k)
/// - B is k×n (flattened to length k*n)
/// - C is m×n (flattened to length m*n)
///
/// # Panics
///
/// Panics if `a.len() != m * k` or `b.len() != k * n`. Inputs read from a
/// [`crate::data::Batch`] can be checked first with `Batch::get_matrix`.
pub fn matmul(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), k * n, "Matrix B size mismatch");

    let mut result_data = vec![0.0; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0;
            for p in 0..k {
                acc += a.data()[i * k + p] * b.data()[p * n + j];
            }
            result_data[i * n + j] = acc;
        }
    }

    let (mut result, record) =
        op_result(Array1::from(result_data), a.requires_grad() || b.requires_grad());

    if record {
        result.set_backward_op(Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    m: usize,
    k: usize,
    n: usize,
    result_grad: GradCell,
}

impl BackwardOp for MatmulBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a, &self.b]
    }

    fn backward(&self) {
        let Some(grad_output) = self.result_grad.borrow().clone() else {
            return;
        };
        let (m, k, n) = (self.m, self.k, self.n);

        // ∂L/∂A = ∂L/∂C @ B^T
        let mut grad_a = vec![0.0; m * k];
        for i in 0..m {
            for p in 0..k {
                grad_a[i * k + p] = (0..n)
                    .map(|j| grad_output[i * n + j] * self.b.data()[p * n + j])
                    .sum();
            }
        }

        // ∂L/∂B = A^T @ ∂L/∂C
        let mut grad_b = vec![0.0; k * n];
        for p in 0..k {
            for j in 0..n {
                grad_b[p * n + j] = (0..m)
                    .map(|i| self.a.data()[i * k + p] * grad_output[i * n + j])
                    .sum();
            }
        }

        propagate(&self.a, Array1::from(grad_a));
        propagate(&self.b, Array1::from(grad_b));
    }
}
