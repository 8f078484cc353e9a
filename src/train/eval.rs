//! Pose accuracy metrics

use super::{Batch, PoseModel};
use crate::network::{PoseOutput, ORIENTATION_DIM, POSE_DIM, POSITION_DIM};
use crate::{Error, Result, Tensor};
use serde::{Deserialize, Serialize};

/// Error of one predicted pose against ground truth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseError {
    /// Euclidean distance between predicted and true position
    pub position: f32,
    /// Rotation angle between predicted and true orientation, in degrees
    pub orientation_deg: f32,
}

fn unit(q: &[f32]) -> Vec<f32> {
    let norm = q.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        q.iter().map(|v| v / norm).collect()
    } else {
        q.to_vec()
    }
}

/// Error of a single pose
///
/// Both quaternions are normalized, and `|⟨q_gt, q_pred⟩|` is clamped to
/// `[0, 1]` before `2 · acos` so `q` and `-q` count as the same rotation.
///
/// # Panics
///
/// Panics unless `position` has 3 values, `orientation` 4 and `ground_truth` 7.
pub fn pose_error(position: &[f32], orientation: &[f32], ground_truth: &[f32]) -> PoseError {
    assert_eq!(position.len(), POSITION_DIM, "pose_error: position must have 3 values");
    assert_eq!(
        orientation.len(),
        ORIENTATION_DIM,
        "pose_error: orientation must have 4 values"
    );
    assert_eq!(ground_truth.len(), POSE_DIM, "pose_error: ground truth must have 7 values");

    let position_err = position
        .iter()
        .zip(&ground_truth[..POSITION_DIM])
        .map(|(p, g)| (p - g) * (p - g))
        .sum::<f32>()
        .sqrt();

    let q_gt = unit(&ground_truth[POSITION_DIM..POSE_DIM]);
    let q_pred = unit(orientation);
    let dot = q_gt
        .iter()
        .zip(&q_pred)
        .map(|(a, b)| a * b)
        .sum::<f32>()
        .abs()
        .clamp(0.0, 1.0);

    PoseError {
        position: position_err,
        orientation_deg: 2.0 * dot.acos().to_degrees(),
    }
}

/// Per-sample errors of a forward pass against `batch × 7` ground truth
pub fn pose_errors(output: &PoseOutput, poses: &Tensor, batch: usize) -> Result<Vec<PoseError>> {
    if output.position.len() != batch * POSITION_DIM
        || output.orientation.len() != batch * ORIENTATION_DIM
        || poses.len() != batch * POSE_DIM
    {
        return Err(Error::ShapeMismatch {
            expected: vec![batch, POSE_DIM],
            got: vec![poses.len()],
        });
    }

    let position = output.position.data().to_vec();
    let orientation = output.orientation.data().to_vec();
    let gt = poses.data().to_vec();
    Ok((0..batch)
        .map(|i| {
            pose_error(
                &position[i * POSITION_DIM..(i + 1) * POSITION_DIM],
                &orientation[i * ORIENTATION_DIM..(i + 1) * ORIENTATION_DIM],
                &gt[i * POSE_DIM..(i + 1) * POSE_DIM],
            )
        })
        .collect())
}

/// Aggregate errors over an evaluation set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub samples: usize,
    pub mean_position: f32,
    pub median_position: f32,
    pub mean_orientation_deg: f32,
    pub median_orientation_deg: f32,
}

fn median(mut values: Vec<f32>) -> f32 {
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

impl EvalSummary {
    /// Summarize per-sample errors; `None` for an empty set
    pub fn from_errors(errors: &[PoseError]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let n = errors.len() as f32;
        let position: Vec<f32> = errors.iter().map(|e| e.position).collect();
        let orientation: Vec<f32> = errors.iter().map(|e| e.orientation_deg).collect();

        Some(Self {
            samples: errors.len(),
            mean_position: position.iter().sum::<f32>() / n,
            median_position: median(position),
            mean_orientation_deg: orientation.iter().sum::<f32>() / n,
            median_orientation_deg: median(orientation),
        })
    }
}

/// Run the model in test mode over `batches` and summarize its pose errors
pub fn evaluate(model: &mut PoseModel, batches: &[Batch]) -> Result<EvalSummary> {
    let mut errors = Vec::new();
    for batch in batches {
        model.set_input(batch)?;
        model.test()?;
        errors.extend(model.test_errors()?);
    }
    EvalSummary::from_errors(&errors)
        .ok_or_else(|| Error::InvalidParameter("evaluation set is empty".to_string()))
}
