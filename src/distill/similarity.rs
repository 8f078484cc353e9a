//! Self-similarity and cross-similarity matrices

use crate::autograd::{l2_normalize_rows, matmul_bt, Tensor};

/// Cosine self-similarity of the rows of a `rows × cols` matrix
///
/// Returns the `rows × rows` matrix `N · Nᵀ` where `N` is `x` with every row
/// L2-normalized. Entry `(i, j)` is the cosine similarity of samples `i` and
/// `j`; all-zero rows have zero similarity to everything.
pub fn self_similarity(x: &Tensor, rows: usize, cols: usize) -> Tensor {
    let normalized = l2_normalize_rows(x, rows, cols);
    matmul_bt(&normalized, &normalized, rows, cols, rows)
}

/// Cross-similarity between two `batch × batch` self-similarity matrices
///
/// Each row of a self-similarity matrix is the relational profile of one
/// sample. Entry `(i, j)` of the result is the cosine between sample `i`'s
/// profile under `ss_a` and sample `j`'s profile under `ss_b`, so the diagonal
/// measures how consistently each sample relates to the rest of the batch in
/// both spaces.
pub fn cross_similarity(ss_a: &Tensor, ss_b: &Tensor, batch: usize) -> Tensor {
    let a = l2_normalize_rows(ss_a, batch, batch);
    let b = l2_normalize_rows(ss_b, batch, batch);
    matmul_bt(&a, &b, batch, batch, batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_self_similarity_diagonal_is_one() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 0.0, -1.0, 0.5, 3.0], false);
        let ss = self_similarity(&x, 3, 2);
        assert_eq!(ss.len(), 9);
        for i in 0..3 {
            assert_abs_diff_eq!(ss.data()[i * 3 + i], 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_self_similarity_is_symmetric() {
        let x = Tensor::from_vec(vec![0.3, -1.2, 2.0, 1.0, 1.0, 0.1], false);
        let ss = self_similarity(&x, 2, 3);
        assert_abs_diff_eq!(ss.data()[1], ss.data()[2], epsilon = 1e-6);
    }

    #[test]
    fn test_self_similarity_orthogonal_rows() {
        let x = Tensor::from_vec(vec![1.0, 0.0, 0.0, 2.0], false);
        let ss = self_similarity(&x, 2, 2);
        assert_abs_diff_eq!(ss.data()[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_similarity_of_identical_profiles() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 0.0, -1.0, 0.5, 3.0], false);
        let ss = self_similarity(&x, 3, 2);
        let cs = cross_similarity(&ss, &ss, 3);
        for i in 0..3 {
            assert_abs_diff_eq!(cs.data()[i * 3 + i], 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_single_sample_batch() {
        let x = Tensor::from_vec(vec![0.2, 0.4, 0.6], false);
        let ss = self_similarity(&x, 1, 3);
        let cs = cross_similarity(&ss, &ss, 1);
        assert_abs_diff_eq!(cs.item(), 1.0, epsilon = 1e-5);
    }
}
