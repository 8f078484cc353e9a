//! Combined pose regression and distillation objective

use super::adapter::HintAdapters;
use super::loss::{CrossSimilarityLoss, CsLossMode, FeatureHintLoss};
use super::similarity::{cross_similarity, self_similarity};
use crate::autograd::{add, l2_normalize_rows, mse, scale, slice_cols, Context, Tensor};
use crate::network::{FeatureMap, PoseNetwork, PoseOutput, POSE_DIM, POSITION_DIM};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which feature maps feed each distillation term
///
/// Indices refer to the feature list returned by the networks' forward pass.
/// The same index is used on the teacher and the student side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureSelection {
    /// Feature maps compared by the hint loss
    #[serde(default)]
    pub hint_modules: Vec<usize>,
    /// Feature maps compared through cross-similarity with ground truth
    #[serde(default)]
    pub cs_modules: Vec<usize>,
}

impl FeatureSelection {
    /// Check every index against the number of available feature maps
    pub fn validate(&self, available: usize, side: &str) -> Result<()> {
        for &index in self.hint_modules.iter().chain(&self.cs_modules) {
            if index >= available {
                return Err(Error::ConfigError(format!(
                    "feature module {index} out of range: {side} network has {available} feature maps"
                )));
            }
        }
        Ok(())
    }

    /// Pick the hint and cross-similarity feature maps out of `features`
    pub fn select(&self, features: &[FeatureMap]) -> Result<(Vec<FeatureMap>, Vec<FeatureMap>)> {
        self.validate(features.len(), "forward pass")?;
        let hint = self.hint_modules.iter().map(|&i| features[i].clone()).collect();
        let cs = self.cs_modules.iter().map(|&i| features[i].clone()).collect();
        Ok((hint, cs))
    }
}

/// Teacher feature maps for one batch, detached from any graph
#[derive(Debug, Clone)]
pub struct TeacherFeatures {
    pub hint: Vec<FeatureMap>,
    pub cs: Vec<FeatureMap>,
}

impl TeacherFeatures {
    /// Run the frozen teacher in evaluation mode without recording gradients
    pub fn extract(
        teacher: &dyn PoseNetwork,
        images: &Tensor,
        batch: usize,
        selection: &FeatureSelection,
    ) -> Result<Self> {
        let output = Context::inference().no_grad(|ctx| teacher.forward(images, batch, ctx))?;
        let detached: Vec<FeatureMap> = output.features.iter().map(FeatureMap::detach).collect();
        let (hint, cs) = selection.select(&detached)?;
        Ok(Self { hint, cs })
    }
}

/// Scalar view of one objective evaluation plus the graph to backpropagate
#[derive(Debug, Clone)]
pub struct LossBreakdown {
    /// Total objective, connected to the student graph
    pub total: Tensor,
    /// Position MSE
    pub position: f32,
    /// Orientation MSE, already weighted by β
    pub orientation: f32,
    /// Weighted feature-hint loss (0 without a teacher)
    pub feature: f32,
    /// Weighted cross-similarity loss (0 without a teacher)
    pub cross_similarity: f32,
}

impl LossBreakdown {
    pub fn total_value(&self) -> f32 {
        self.total.item()
    }
}

/// Supervised pose loss: `mse(p, p_gt) + β · mse(q, normalize(q_gt))`
///
/// `poses` is the `batch × 7` ground truth (position then quaternion).
/// Returns the loss tensor, the position term and the β-weighted orientation term.
pub fn pose_loss(
    output: &PoseOutput,
    poses: &Tensor,
    batch: usize,
    beta: f32,
) -> Result<(Tensor, f32, f32)> {
    if poses.len() != batch * POSE_DIM {
        return Err(Error::ShapeMismatch {
            expected: vec![batch, POSE_DIM],
            got: vec![poses.len()],
        });
    }

    let position_gt = slice_cols(poses, batch, POSE_DIM, 0, POSITION_DIM);
    let orientation_gt = l2_normalize_rows(
        &slice_cols(poses, batch, POSE_DIM, POSITION_DIM, POSE_DIM),
        batch,
        POSE_DIM - POSITION_DIM,
    );

    let mse_pos = mse(&output.position, &position_gt);
    let mse_ori = scale(&mse(&output.orientation, &orientation_gt), beta);
    let position = mse_pos.item();
    let orientation = mse_ori.item();

    Ok((add(&mse_pos, &mse_ori), position, orientation))
}

/// Settings of the distillation terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistillConfig {
    #[serde(flatten)]
    pub selection: FeatureSelection,

    /// Loss used to compare cross-similarity matrices
    #[serde(default)]
    pub cs_loss: CsLossMode,

    /// Weight of the feature-hint term
    #[serde(default = "default_weight")]
    pub hint_weight: f32,

    /// Weight of the cross-similarity term
    #[serde(default = "default_weight")]
    pub cs_weight: f32,

    /// Softmax temperature of the feature-hint term
    #[serde(default = "default_weight")]
    pub temperature: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            selection: FeatureSelection::default(),
            cs_loss: CsLossMode::default(),
            hint_weight: 1.0,
            cs_weight: 1.0,
            temperature: 1.0,
        }
    }
}

/// Knowledge-distillation objective over a student and a frozen teacher
///
/// ```text
/// L = L_gt + w_hint · Σ_hint KL(T_l ‖ A_l(S_l)) + w_cs · Σ_cs D(CS(T_l, Gt), CS(S_l, Gt))
/// ```
///
/// `A_l` is the student-side hint adapter (identity when widths match),
/// `CS(F, Gt)` the cross-similarity of the self-similarity of features `F`
/// with the self-similarity of the ground-truth poses, and `D` the configured
/// cross-similarity comparison.
pub struct DistillationObjective {
    selection: FeatureSelection,
    hint_loss: FeatureHintLoss,
    cs_loss: CrossSimilarityLoss,
    hint_weight: f32,
    cs_weight: f32,
    adapters: HintAdapters,
}

impl DistillationObjective {
    /// Build the objective for a given student/teacher pair
    ///
    /// Validates the selected modules against both networks and creates hint
    /// adapters for pairs whose widths differ.
    pub fn new(
        config: &DistillConfig,
        student_dims: &[usize],
        teacher_dims: &[usize],
        seed: u64,
    ) -> Result<Self> {
        let selection = config.selection.clone();
        selection.validate(student_dims.len(), "student")?;
        selection.validate(teacher_dims.len(), "teacher")?;
        if config.temperature <= 0.0 {
            return Err(Error::ConfigError(format!(
                "distillation temperature must be > 0, got {}",
                config.temperature
            )));
        }

        let pairs: Vec<(usize, usize)> = selection
            .hint_modules
            .iter()
            .map(|&i| (student_dims[i], teacher_dims[i]))
            .collect();
        let adapters = HintAdapters::new(&pairs, seed);

        Ok(Self {
            selection,
            hint_loss: FeatureHintLoss::new(config.temperature),
            cs_loss: CrossSimilarityLoss::new(config.cs_loss),
            hint_weight: config.hint_weight,
            cs_weight: config.cs_weight,
            adapters,
        })
    }

    pub fn selection(&self) -> &FeatureSelection {
        &self.selection
    }

    pub fn adapters(&self) -> &HintAdapters {
        &self.adapters
    }

    pub fn adapters_mut(&mut self) -> &mut HintAdapters {
        &mut self.adapters
    }

    /// Sum of hint losses over the selected layers, unweighted
    pub fn feature_loss(&self, teacher: &[FeatureMap], student: &[FeatureMap]) -> Result<Tensor> {
        let mut total = Tensor::zeros(1, false);
        for (i, (t, s)) in teacher.iter().zip(student).enumerate() {
            let aligned = self.adapters.forward(i, s)?;
            total = add(&total, &self.hint_loss.forward(t, &aligned)?);
        }
        Ok(total)
    }

    /// Sum of cross-similarity losses over the selected layers, unweighted
    pub fn cs_loss(
        &self,
        teacher: &[FeatureMap],
        student: &[FeatureMap],
        poses: &Tensor,
        batch: usize,
    ) -> Result<Tensor> {
        let ss_gt = self_similarity(poses, batch, POSE_DIM);
        let mut total = Tensor::zeros(1, false);
        for (t, s) in teacher.iter().zip(student) {
            let ss_t = self_similarity(&t.data, t.rows, t.cols);
            let ss_s = self_similarity(&s.data, s.rows, s.cols);
            let cs_t_gt = cross_similarity(&ss_t, &ss_gt, batch);
            let cs_s_gt = cross_similarity(&ss_s, &ss_gt, batch);
            total = add(&total, &self.cs_loss.forward(&cs_t_gt, &cs_s_gt, batch)?);
        }
        Ok(total)
    }

    /// Evaluate the full objective for one batch
    pub fn compute(
        &self,
        student: &PoseOutput,
        teacher: &TeacherFeatures,
        poses: &Tensor,
        batch: usize,
        beta: f32,
    ) -> Result<LossBreakdown> {
        let (loss_gt, position, orientation) = pose_loss(student, poses, batch, beta)?;
        let (student_hint, student_cs) = self.selection.select(&student.features)?;

        let loss_feature = scale(
            &self.feature_loss(&teacher.hint, &student_hint)?,
            self.hint_weight,
        );
        let loss_cs = scale(
            &self.cs_loss(&teacher.cs, &student_cs, poses, batch)?,
            self.cs_weight,
        );

        let feature = loss_feature.item();
        let cross_similarity = loss_cs.item();
        debug!(
            position,
            orientation, feature, cross_similarity, "distillation objective"
        );

        Ok(LossBreakdown {
            total: add(&add(&loss_gt, &loss_feature), &loss_cs),
            position,
            orientation,
            feature,
            cross_similarity,
        })
    }
}

/// Objective without a teacher: the supervised pose loss only
pub fn supervised_objective(
    student: &PoseOutput,
    poses: &Tensor,
    batch: usize,
    beta: f32,
) -> Result<LossBreakdown> {
    let (total, position, orientation) = pose_loss(student, poses, batch, beta)?;
    Ok(LossBreakdown {
        total,
        position,
        orientation,
        feature: 0.0,
        cross_similarity: 0.0,
    })
}
