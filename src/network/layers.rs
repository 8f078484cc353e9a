//! Dense layer helpers shared by networks and hint adapters

use crate::autograd::{add_row_bias, matmul, Tensor};
use rand::Rng;

/// Fully connected layer: `x · W + b`
///
/// `x` is `rows × in_dim`, `weight` is `in_dim × out_dim`, `bias` is `out_dim`.
pub fn linear(
    x: &Tensor,
    weight: &Tensor,
    bias: &Tensor,
    rows: usize,
    in_dim: usize,
    out_dim: usize,
) -> Tensor {
    let projected = matmul(x, weight, rows, in_dim, out_dim);
    add_row_bias(&projected, bias, rows, out_dim)
}

/// Xavier/Glorot uniform initialization for an `in_dim × out_dim` weight
pub fn xavier_uniform<R: Rng>(rng: &mut R, in_dim: usize, out_dim: usize) -> Vec<f32> {
    let limit = (6.0 / (in_dim + out_dim) as f32).sqrt();
    (0..in_dim * out_dim)
        .map(|_| rng.gen_range(-limit..limit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_forward() {
        // [1 2] · [[1 0] [0 1]] + [0.5 -0.5]
        let x = Tensor::from_vec(vec![1.0, 2.0], false);
        let w = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], false);
        let b = Tensor::from_vec(vec![0.5, -0.5], false);
        let y = linear(&x, &w, &b, 1, 2, 2);
        assert_eq!(y.data().to_vec(), vec![1.5, 1.5]);
    }

    #[test]
    fn test_xavier_uniform_bounds_and_determinism() {
        let mut rng_a = StdRng::seed_from_u64(3);
        let mut rng_b = StdRng::seed_from_u64(3);
        let a = xavier_uniform(&mut rng_a, 10, 5);
        let b = xavier_uniform(&mut rng_b, 10, 5);

        let limit = (6.0f32 / 15.0).sqrt();
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.abs() <= limit));
    }
}
