//! Autograd operations with backward passes
//!
//! Matrix operations take row-major flat tensors with explicit dimensions.

use super::tensor::GradCell;
use super::{BackwardOp, Tensor};
use ndarray::{Array1, Array2};
use std::rc::Rc;

/// Norm floor used by [`l2_normalize_rows`]
pub const NORMALIZE_EPS: f32 = 1e-12;

fn matrix(data: &Array1<f32>, rows: usize, cols: usize) -> Array2<f32> {
    assert_eq!(data.len(), rows * cols, "matrix: {rows}x{cols} does not fit {} values", data.len());
    Array2::from_shape_fn((rows, cols), |(r, c)| data[r * cols + c])
}

/// Add two tensors
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "add: operands must have same length");
    let data = a.data() + b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            sign: 1.0,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Subtract `b` from `a` element-wise
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "sub: operands must have same length");
    let data = a.data() - b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            sign: -1.0,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    // +1 for add, -1 for sub
    sign: f32,
    result_grad: GradCell,
}

impl BackwardOp for AddBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad * self.sign);
            }
        }
    }
}

/// Multiply two tensors element-wise
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "mul: operands must have same length");
    let data = a.data() * b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for MulBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * b
                self.a.accumulate_grad(grad * self.b.data());
            }
            if self.b.requires_grad() {
                // ∂L/∂b = ∂L/∂out * a
                self.b.accumulate_grad(grad * self.a.data());
            }
        }
    }
}

/// Scale tensor by a scalar
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for ScaleBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.factor);
            }
        }
    }
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ReluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for ReluBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * (a > 0)
                let grad_a = grad * &self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad_a);
            }
        }
    }
}

/// Sum all elements
pub fn sum(a: &Tensor) -> Tensor {
    reduce(a, 1.0)
}

/// Mean of all elements
pub fn mean(a: &Tensor) -> Tensor {
    assert!(!a.is_empty(), "mean: tensor must not be empty");
    reduce(a, 1.0 / a.len() as f32)
}

fn reduce(a: &Tensor, factor: f32) -> Tensor {
    let data = Array1::from(vec![a.data().sum() * factor]);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SumBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SumBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for SumBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂sum * factor (broadcast)
                let grad_a = Array1::from_elem(self.a.len(), grad[0] * self.factor);
                self.a.accumulate_grad(grad_a);
            }
        }
    }
}

/// Matrix multiplication
///
/// Computes C = A @ B where:
/// - A is m×k (flattened to length m*k)
/// - B is k×n (flattened to length k*n)
/// - C is m×n (flattened to length m*n)
pub fn matmul(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), k * n, "Matrix B size mismatch");

    let c = matrix(a.data(), m, k).dot(&matrix(b.data(), k, n));
    let data = Array1::from_iter(c.iter().copied());

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            transpose_b: false,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Matrix multiplication against a transposed right operand
///
/// Computes C = A @ Bᵀ where A is m×k and B is stored n×k. Used for
/// Gram / similarity matrices.
pub fn matmul_bt(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), n * k, "Matrix B size mismatch");

    let c = matrix(a.data(), m, k).dot(&matrix(b.data(), n, k).t());
    let data = Array1::from_iter(c.iter().copied());

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            transpose_b: true,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    m: usize,
    k: usize,
    n: usize,
    transpose_b: bool,
    result_grad: GradCell,
}

impl BackwardOp for MatmulBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let g = matrix(grad_output, self.m, self.n);
            let a = matrix(self.a.data(), self.m, self.k);

            if self.transpose_b {
                // C = A Bᵀ: ∂L/∂A = G B, ∂L/∂B = Gᵀ A
                let b = matrix(self.b.data(), self.n, self.k);
                if self.a.requires_grad() {
                    let grad_a = g.dot(&b);
                    self.a.accumulate_grad(Array1::from_iter(grad_a.iter().copied()));
                }
                if self.b.requires_grad() {
                    let grad_b = g.t().dot(&a);
                    self.b.accumulate_grad(Array1::from_iter(grad_b.iter().copied()));
                }
            } else {
                // C = A B: ∂L/∂A = G Bᵀ, ∂L/∂B = Aᵀ G
                let b = matrix(self.b.data(), self.k, self.n);
                if self.a.requires_grad() {
                    let grad_a = g.dot(&b.t());
                    self.a.accumulate_grad(Array1::from_iter(grad_a.iter().copied()));
                }
                if self.b.requires_grad() {
                    let grad_b = a.t().dot(&g);
                    self.b.accumulate_grad(Array1::from_iter(grad_b.iter().copied()));
                }
            }
        }
    }
}

/// Add a bias row vector to every row of a rows×cols matrix
pub fn add_row_bias(x: &Tensor, bias: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "add_row_bias: matrix size mismatch");
    assert_eq!(bias.len(), cols, "add_row_bias: bias length must equal cols");

    let mut out = matrix(x.data(), rows, cols);
    out += &matrix(bias.data(), 1, cols);
    let data = Array1::from_iter(out.iter().copied());

    let requires_grad = x.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(RowBiasBackward {
            x: x.clone(),
            bias: bias.clone(),
            rows,
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct RowBiasBackward {
    x: Tensor,
    bias: Tensor,
    rows: usize,
    cols: usize,
    result_grad: GradCell,
}

impl BackwardOp for RowBiasBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.bias.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }
            if self.bias.requires_grad() {
                let grad_bias = matrix(grad, self.rows, self.cols).sum_axis(ndarray::Axis(0));
                self.bias.accumulate_grad(grad_bias);
            }
        }
    }
}

/// Select columns `start..end` of a rows×cols matrix
pub fn slice_cols(x: &Tensor, rows: usize, cols: usize, start: usize, end: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "slice_cols: matrix size mismatch");
    assert!(
        start < end && end <= cols,
        "slice_cols: invalid column range {start}..{end} for {cols} columns"
    );

    let sliced = matrix(x.data(), rows, cols).slice(ndarray::s![.., start..end]).to_owned();
    let data = Array1::from_iter(sliced.iter().copied());

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SliceColsBackward {
            x: x.clone(),
            rows,
            cols,
            start,
            end,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SliceColsBackward {
    x: Tensor,
    rows: usize,
    cols: usize,
    start: usize,
    end: usize,
    result_grad: GradCell,
}

impl BackwardOp for SliceColsBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let width = self.end - self.start;
                let mut grad_x = Array1::zeros(self.rows * self.cols);
                for r in 0..self.rows {
                    for c in 0..width {
                        grad_x[r * self.cols + self.start + c] = grad[r * width + c];
                    }
                }
                self.x.accumulate_grad(grad_x);
            }
        }
    }
}

/// L2-normalize each row: `x / max(‖x‖₂, 1e-12)`
pub fn l2_normalize_rows(x: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "l2_normalize_rows: matrix size mismatch");

    let norms: Vec<f32> = matrix(x.data(), rows, cols)
        .rows()
        .into_iter()
        .map(|row| row.dot(&row).sqrt())
        .collect();

    let mut data = x.data().clone();
    for (r, &norm) in norms.iter().enumerate() {
        let denom = norm.max(NORMALIZE_EPS);
        for c in 0..cols {
            data[r * cols + c] /= denom;
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data.clone(), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(NormalizeBackward {
            x: x.clone(),
            output: data,
            norms,
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct NormalizeBackward {
    x: Tensor,
    output: Array1<f32>,
    norms: Vec<f32>,
    cols: usize,
    result_grad: GradCell,
}

impl BackwardOp for NormalizeBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let cols = self.cols;
                let mut grad_x = Array1::zeros(self.x.len());
                for (r, &norm) in self.norms.iter().enumerate() {
                    let span = r * cols..(r + 1) * cols;
                    if norm > NORMALIZE_EPS {
                        // ∂y/∂x = (I - y yᵀ) / ‖x‖
                        let dot: f32 = span
                            .clone()
                            .map(|i| self.output[i] * grad[i])
                            .sum();
                        for i in span {
                            grad_x[i] = (grad[i] - self.output[i] * dot) / norm;
                        }
                    } else {
                        // clamped denominator is constant
                        for i in span {
                            grad_x[i] = grad[i] / NORMALIZE_EPS;
                        }
                    }
                }
                self.x.accumulate_grad(grad_x);
            }
        }
    }
}

/// Softmax over each row of a rows×cols matrix
pub fn softmax_rows(x: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "softmax_rows: matrix size mismatch");

    let mut data = x.data().clone();
    for r in 0..rows {
        let span = r * cols..(r + 1) * cols;
        // Subtract max for numerical stability
        let max_val = span
            .clone()
            .map(|i| data[i])
            .fold(f32::NEG_INFINITY, f32::max);
        for i in span.clone() {
            data[i] = (data[i] - max_val).exp();
        }
        let sum_exp: f32 = span.clone().map(|i| data[i]).sum();
        for i in span {
            data[i] /= sum_exp;
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data.clone(), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SoftmaxBackward {
            x: x.clone(),
            probs: data,
            cols,
            log_space: false,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Log-softmax over each row of a rows×cols matrix
pub fn log_softmax_rows(x: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "log_softmax_rows: matrix size mismatch");

    let mut data = x.data().clone();
    let mut probs = x.data().clone();
    for r in 0..rows {
        let span = r * cols..(r + 1) * cols;
        let max_val = span
            .clone()
            .map(|i| data[i])
            .fold(f32::NEG_INFINITY, f32::max);
        let log_sum_exp = span
            .clone()
            .map(|i| (data[i] - max_val).exp())
            .sum::<f32>()
            .ln()
            + max_val;
        for i in span {
            data[i] -= log_sum_exp;
            probs[i] = data[i].exp();
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SoftmaxBackward {
            x: x.clone(),
            probs,
            cols,
            log_space: true,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SoftmaxBackward {
    x: Tensor,
    probs: Array1<f32>,
    cols: usize,
    log_space: bool,
    result_grad: GradCell,
}

impl BackwardOp for SoftmaxBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let rows = self.x.len() / self.cols;
                let mut grad_x = Array1::zeros(self.x.len());
                for r in 0..rows {
                    let span = r * self.cols..(r + 1) * self.cols;
                    if self.log_space {
                        // ∂L/∂x = g - p * Σg
                        let total: f32 = span.clone().map(|i| grad[i]).sum();
                        for i in span {
                            grad_x[i] = grad[i] - self.probs[i] * total;
                        }
                    } else {
                        // ∂L/∂x = y ⊙ (g - (y · g))
                        let dot: f32 = span.clone().map(|i| self.probs[i] * grad[i]).sum();
                        for i in span {
                            grad_x[i] = self.probs[i] * (grad[i] - dot);
                        }
                    }
                }
                self.x.accumulate_grad(grad_x);
            }
        }
    }
}

/// Mean squared error between two tensors of equal length
pub fn mse(pred: &Tensor, target: &Tensor) -> Tensor {
    assert_eq!(
        pred.len(),
        target.len(),
        "Predictions and targets must have same length"
    );
    assert!(!pred.is_empty(), "mse: tensors must not be empty");

    let diff = pred.data() - target.data();
    let value = diff.mapv(|d| d * d).mean().unwrap_or(0.0);

    let requires_grad = pred.requires_grad() || target.requires_grad();
    let mut result = Tensor::from_vec(vec![value], requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MseBackward {
            pred: pred.clone(),
            target: target.clone(),
            diff,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MseBackward {
    pred: Tensor,
    target: Tensor,
    diff: Array1<f32>,
    result_grad: GradCell,
}

impl BackwardOp for MseBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.pred.clone(), self.target.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // d(MSE)/d(pred) = 2 * (pred - target) / n
            let n = self.diff.len() as f32;
            let grad_pred = &self.diff * (2.0 * grad[0] / n);
            if self.target.requires_grad() {
                self.target.accumulate_grad(-&grad_pred);
            }
            if self.pred.requires_grad() {
                self.pred.accumulate_grad(grad_pred);
            }
        }
    }
}

/// KL divergence with batch-mean reduction
///
/// `log_q` holds log-probabilities, `p` target probabilities, both rows×cols.
/// Returns `Σ p (ln p - log_q) / rows`, with `0 · ln 0 = 0`. The value is
/// clamped at zero, which rounding can otherwise undershoot when `q == p`.
pub fn kl_div_batchmean(log_q: &Tensor, p: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(log_q.len(), rows * cols, "kl_div: input size mismatch");
    assert_eq!(p.len(), rows * cols, "kl_div: target size mismatch");
    assert!(rows > 0, "kl_div: batch must not be empty");

    let value: f32 = p
        .data()
        .iter()
        .zip(log_q.data().iter())
        .filter(|(p_i, _)| **p_i > 0.0)
        .map(|(&p_i, &lq_i)| p_i * (p_i.ln() - lq_i))
        .sum::<f32>()
        / rows as f32;
    let value = value.max(0.0);

    let requires_grad = log_q.requires_grad() || p.requires_grad();
    let mut result = Tensor::from_vec(vec![value], requires_grad);

    if requires_grad {
        let backward_op = Rc::new(KlDivBackward {
            log_q: log_q.clone(),
            p: p.clone(),
            rows,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct KlDivBackward {
    log_q: Tensor,
    p: Tensor,
    rows: usize,
    result_grad: GradCell,
}

impl BackwardOp for KlDivBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.log_q.clone(), self.p.clone()]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let factor = grad[0] / self.rows as f32;
            if self.log_q.requires_grad() {
                // ∂/∂log_q = -p / rows
                self.log_q.accumulate_grad(self.p.data() * -factor);
            }
            if self.p.requires_grad() {
                // ∂/∂p = (ln p + 1 - log_q) / rows, zero where p = 0
                let grad_p = Array1::from_iter(
                    self.p
                        .data()
                        .iter()
                        .zip(self.log_q.data().iter())
                        .map(|(&p_i, &lq_i)| {
                            if p_i > 0.0 {
                                (p_i.ln() + 1.0 - lq_i) * factor
                            } else {
                                0.0
                            }
                        }),
                );
                self.p.accumulate_grad(grad_p);
            }
        }
    }
}
