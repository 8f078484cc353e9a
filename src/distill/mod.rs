//! Knowledge distillation for pose regression
//!
//! A frozen teacher network guides a student through two extra terms on top of
//! the supervised pose loss:
//!
//! - **Feature hints**: temperature-scaled KL divergence between the
//!   L2-normalized teacher and student feature maps of selected layers
//! - **Cross-similarity**: agreement between how the teacher's and the
//!   student's batch self-similarity relate to the ground-truth pose
//!   self-similarity
//!
//! ## Example
//!
//! ```
//! use posekd::distill::{cross_similarity, self_similarity, CrossSimilarityLoss};
//! use posekd::Tensor;
//!
//! let poses = Tensor::from_vec(vec![0.0, 1.0, 2.0, 1.0, 0.0, 1.0], false);
//! let teacher = Tensor::from_vec(vec![0.5, 0.1, 0.2, 0.9, 0.3, 0.3], false);
//! let student = Tensor::from_vec(vec![1.0, -1.0, 0.2, 0.9, -0.5, 0.3], true);
//!
//! let ss_gt = self_similarity(&poses, 3, 2);
//! let cs_t = cross_similarity(&self_similarity(&teacher, 3, 2), &ss_gt, 3);
//! let cs_s = cross_similarity(&self_similarity(&student, 3, 2), &ss_gt, 3);
//!
//! let loss = CrossSimilarityLoss::default().forward(&cs_t, &cs_s, 3).unwrap();
//! assert!(loss.item() > 0.0);
//! ```

mod adapter;
mod loss;
mod objective;
mod similarity;


pub use adapter::HintAdapters;
pub use loss::{CrossSimilarityLoss, CsLossMode, FeatureHintLoss};
pub use objective::{
    pose_loss, supervised_objective, DistillConfig, DistillationObjective, FeatureSelection,
    LossBreakdown, TeacherFeatures,
};
pub use similarity::{cross_similarity, self_similarity};
