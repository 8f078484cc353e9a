//! Distillation loss terms

use crate::autograd::{
    kl_div_batchmean, l2_normalize_rows, log_softmax_rows, mse, scale, softmax_rows, Tensor,
};
use crate::network::FeatureMap;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Feature-hint loss between a teacher and a student feature map
///
/// # Formula
///
/// ```text
/// L = T² · KL( softmax(norm(F_t) / T) || log_softmax(norm(F_s) / T) )
/// ```
///
/// where `norm` L2-normalizes each sample's feature vector, KL is averaged
/// over the batch and T is the temperature (1 by default).
///
/// # Example
///
/// ```
/// use posekd::distill::FeatureHintLoss;
/// use posekd::network::FeatureMap;
/// use posekd::Tensor;
///
/// let teacher = FeatureMap::new(Tensor::from_vec(vec![1.0, 0.0, 2.0, 1.0], false), 2, 2);
/// let student = FeatureMap::new(Tensor::from_vec(vec![0.5, 0.5, 1.0, 1.0], true), 2, 2);
///
/// let loss = FeatureHintLoss::default().forward(&teacher, &student).unwrap();
/// assert!(loss.item() >= 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct FeatureHintLoss {
    /// Temperature applied to the normalized features before the softmax
    pub temperature: f32,
}

impl FeatureHintLoss {
    /// Create a hint loss with the given temperature
    ///
    /// # Panics
    ///
    /// Panics if temperature <= 0
    pub fn new(temperature: f32) -> Self {
        assert!(
            temperature > 0.0,
            "Temperature must be positive, got {}",
            temperature
        );
        Self { temperature }
    }

    /// Compute the hint loss; the teacher side never receives gradients
    pub fn forward(&self, teacher: &FeatureMap, student: &FeatureMap) -> Result<Tensor> {
        if teacher.rows != student.rows || teacher.cols != student.cols {
            return Err(Error::ShapeMismatch {
                expected: vec![teacher.rows, teacher.cols],
                got: vec![student.rows, student.cols],
            });
        }
        let (rows, cols) = (student.rows, student.cols);
        let inv_t = 1.0 / self.temperature;

        let s = scale(&l2_normalize_rows(&student.data, rows, cols), inv_t);
        let t = scale(&l2_normalize_rows(&teacher.data.detach(), rows, cols), inv_t);

        let log_q = log_softmax_rows(&s, rows, cols);
        let p = softmax_rows(&t, rows, cols);
        let kl = kl_div_batchmean(&log_q, &p, rows, cols);

        Ok(scale(&kl, self.temperature * self.temperature))
    }
}

impl Default for FeatureHintLoss {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// How two cross-similarity matrices are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsLossMode {
    /// Row-wise KL divergence between softmax-ed matrices
    #[default]
    Kl,
    /// Mean squared error between the raw matrices
    Mse,
}

/// Cross-similarity consistency loss
///
/// Compares the student's cross-similarity with ground truth against the
/// teacher's. In KL mode each row is treated as a distribution over the batch:
/// `KL(softmax(CS_t) || log_softmax(CS_s))`, averaged over rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossSimilarityLoss {
    pub mode: CsLossMode,
}

impl CrossSimilarityLoss {
    pub fn new(mode: CsLossMode) -> Self {
        Self { mode }
    }

    /// Compare two `batch × batch` cross-similarity matrices
    pub fn forward(&self, cs_teacher: &Tensor, cs_student: &Tensor, batch: usize) -> Result<Tensor> {
        let expected = batch * batch;
        if cs_teacher.len() != expected || cs_student.len() != expected {
            return Err(Error::ShapeMismatch {
                expected: vec![batch, batch],
                got: vec![cs_teacher.len(), cs_student.len()],
            });
        }

        let target = cs_teacher.detach();
        Ok(match self.mode {
            CsLossMode::Kl => {
                let log_q = log_softmax_rows(cs_student, batch, batch);
                let p = softmax_rows(&target, batch, batch);
                kl_div_batchmean(&log_q, &p, batch, batch)
            }
            CsLossMode::Mse => mse(cs_student, &target),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use crate::distill::{cross_similarity, self_similarity};
    use approx::assert_abs_diff_eq;

    fn feature(values: Vec<f32>, rows: usize, cols: usize, grad: bool) -> FeatureMap {
        FeatureMap::new(Tensor::from_vec(values, grad), rows, cols)
    }

    #[test]
    fn test_hint_loss_zero_for_identical_features() {
        let values = vec![0.3, 1.0, -0.4, 2.0, 0.0, 1.0];
        let loss = FeatureHintLoss::default()
            .forward(&feature(values.clone(), 2, 3, false), &feature(values, 2, 3, true))
            .unwrap();
        assert_abs_diff_eq!(loss.item(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hint_loss_is_scale_invariant() {
        // Features are L2-normalized first, so scaling the student changes nothing
        let teacher = feature(vec![1.0, 0.0, 0.5, 0.5], 2, 2, false);
        let a = FeatureHintLoss::default()
            .forward(&teacher, &feature(vec![0.2, 0.8, 1.0, -1.0], 2, 2, false))
            .unwrap();
        let b = FeatureHintLoss::default()
            .forward(&teacher, &feature(vec![2.0, 8.0, 10.0, -10.0], 2, 2, false))
            .unwrap();
        assert_abs_diff_eq!(a.item(), b.item(), epsilon = 1e-6);
    }

    #[test]
    fn test_hint_loss_gradient_only_reaches_student() {
        let teacher = feature(vec![1.0, 0.0, 0.0, 1.0], 2, 2, true);
        let student = feature(vec![0.0, 1.0, 1.0, 0.0], 2, 2, true);
        let mut loss = FeatureHintLoss::default().forward(&teacher, &student).unwrap();
        assert!(loss.item() > 0.0);

        backward(&mut loss, None);
        assert!(student.data.grad().is_some());
        assert!(teacher.data.grad().is_none());
    }

    #[test]
    fn test_hint_loss_shape_mismatch() {
        let result = FeatureHintLoss::default().forward(
            &feature(vec![1.0; 6], 2, 3, false),
            &feature(vec![1.0; 4], 2, 2, true),
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    #[should_panic(expected = "Temperature must be positive")]
    fn test_negative_temperature_panics() {
        FeatureHintLoss::new(-1.0);
    }

    #[test]
    fn test_cs_loss_kl_zero_for_equal_matrices() {
        let cs = Tensor::from_vec(vec![1.0, 0.2, 0.2, 1.0], false);
        let loss = CrossSimilarityLoss::new(CsLossMode::Kl)
            .forward(&cs, &cs, 2)
            .unwrap();
        assert_abs_diff_eq!(loss.item(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cs_loss_kl_never_negative_for_matching_relations() {
        // Swapping feature columns keeps every cosine, so both sides match
        let poses = Tensor::from_vec(vec![0.0, 1.0, 2.0, 1.0, 0.0, 1.0], false);
        let teacher = Tensor::from_vec(vec![0.5, 0.1, 0.2, 0.9, 0.3, 0.3], false);
        let student = Tensor::from_vec(vec![0.1, 0.5, 0.9, 0.2, 0.3, 0.3], true);

        let ss_gt = self_similarity(&poses, 3, 2);
        let cs_t = cross_similarity(&self_similarity(&teacher, 3, 2), &ss_gt, 3);
        let cs_s = cross_similarity(&self_similarity(&student, 3, 2), &ss_gt, 3);

        let kl = CrossSimilarityLoss::new(CsLossMode::Kl)
            .forward(&cs_t, &cs_s, 3)
            .unwrap();
        assert!(kl.item() >= 0.0);
        assert_abs_diff_eq!(kl.item(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cs_loss_kl_positive_for_different_relations() {
        let poses = Tensor::from_vec(vec![0.0, 1.0, 2.0, 1.0, 0.0, 1.0], false);
        let teacher = Tensor::from_vec(vec![0.5, 0.1, 0.2, 0.9, 0.3, 0.3], false);
        let student = Tensor::from_vec(vec![1.0, -1.0, 0.2, 0.9, -0.5, 0.3], true);

        let ss_gt = self_similarity(&poses, 3, 2);
        let cs_t = cross_similarity(&self_similarity(&teacher, 3, 2), &ss_gt, 3);
        let cs_s = cross_similarity(&self_similarity(&student, 3, 2), &ss_gt, 3);

        let kl = CrossSimilarityLoss::default().forward(&cs_t, &cs_s, 3).unwrap();
        assert_abs_diff_eq!(kl.item(), 0.00712, epsilon = 1e-4);
    }

    #[test]
    fn test_cs_loss_mse_value() {
        let teacher = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], false);
        let student = Tensor::from_vec(vec![0.0, 0.0, 0.0, 1.0], true);
        let loss = CrossSimilarityLoss::new(CsLossMode::Mse)
            .forward(&teacher, &student, 2)
            .unwrap();
        assert_abs_diff_eq!(loss.item(), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_cs_loss_rejects_wrong_size() {
        let a = Tensor::from_vec(vec![1.0; 4], false);
        let b = Tensor::from_vec(vec![1.0; 9], false);
        assert!(CrossSimilarityLoss::default().forward(&a, &b, 2).is_err());
    }

    #[test]
    fn test_cs_mode_yaml_names() {
        let mode: CsLossMode = serde_yaml::from_str("mse").unwrap();
        assert_eq!(mode, CsLossMode::Mse);
        assert_eq!(CsLossMode::default(), CsLossMode::Kl);
    }
}
