//! YAML schema definitions for declarative training configuration

use crate::distill::DistillConfig;
use crate::io::CheckpointFormat;
use crate::network::NetworkSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete training specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSpec {
    /// Student and optional teacher networks
    pub model: ModelSpec,

    /// Data configuration
    pub data: DataConfig,

    /// Optimizer configuration
    #[serde(default)]
    pub optimizer: OptimSpec,

    /// Distillation terms; only used when a teacher is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distill: Option<DistillConfig>,

    /// Training hyperparameters
    #[serde(default)]
    pub training: TrainingParams,
}

impl TrainSpec {
    /// Whether training distills from a teacher
    pub fn is_distilling(&self) -> bool {
        self.model.teacher.is_some()
    }

    /// Distillation settings, defaulted when the section is absent
    pub fn distill_config(&self) -> DistillConfig {
        self.distill.clone().unwrap_or_default()
    }
}

/// Networks taking part in training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// The network being trained
    pub student: NetworkSpec,

    /// Pretrained network guiding the student
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<TeacherSpec>,

    /// Checkpoint the student starts from instead of random weights
    ///
    /// Ignored when resuming a plain run with `continue_train`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_init: Option<PathBuf>,
}

/// Teacher architecture and its pretrained weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherSpec {
    pub network: NetworkSpec,

    /// Checkpoint holding the teacher parameters
    pub weights: PathBuf,
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Training dataset (JSON)
    pub train: PathBuf,

    /// Optional validation dataset (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<PathBuf>,

    /// Batch size
    pub batch_size: usize,

    /// Flattened image width
    pub input_dim: usize,

    /// Mean image (JSON array); overrides one embedded in the dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_image: Option<PathBuf>,

    /// Shuffle training samples every epoch
    #[serde(default = "default_true")]
    pub shuffle: bool,
}

/// Adam hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimSpec {
    #[serde(default = "default_lr")]
    pub lr: f32,

    #[serde(default = "default_beta1")]
    pub beta1: f32,

    #[serde(default = "default_beta2")]
    pub beta2: f32,

    /// Added to the root of the second moment
    #[serde(default = "default_eps")]
    pub eps: f32,

    /// L2 penalty added to the gradient
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f32,
}

impl Default for OptimSpec {
    fn default() -> Self {
        Self {
            lr: default_lr(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            weight_decay: default_weight_decay(),
        }
    }
}

/// Learning rate policy over epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LrPolicy {
    /// Full rate, then `lr / niter_decay` less per epoch over the last `niter_decay` epochs
    #[default]
    Linear,
    /// Cosine annealing from `lr` to zero over all epochs
    Cosine,
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Total number of epochs
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Weight of the orientation term in the pose loss
    #[serde(default = "default_beta")]
    pub beta: f32,

    /// Gradient clipping threshold (global L2 norm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grad_clip: Option<f32>,

    /// Learning rate policy
    #[serde(default)]
    pub lr_policy: LrPolicy,

    /// Epochs at the end of training over which the rate decays linearly
    #[serde(default)]
    pub niter_decay: usize,

    /// Output directory for checkpoints
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Save an epoch-labeled checkpoint every N epochs (0 disables)
    #[serde(default = "default_save_every")]
    pub save_every: usize,

    /// Checkpoint file format
    #[serde(default)]
    pub checkpoint_format: CheckpointFormat,

    /// Resume the student from `which_epoch` (ignored when distilling)
    #[serde(default)]
    pub continue_train: bool,

    /// Checkpoint label to resume from
    #[serde(default = "default_which_epoch")]
    pub which_epoch: String,

    /// Seed for initialization, dropout and shuffling
    #[serde(default)]
    pub seed: u64,

    /// Log progress every N steps
    #[serde(default = "default_log_every")]
    pub log_every: usize,

    /// Stop after this many epochs without improvement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patience: Option<usize>,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            beta: default_beta(),
            grad_clip: None,
            lr_policy: LrPolicy::default(),
            niter_decay: 0,
            output_dir: default_output_dir(),
            save_every: default_save_every(),
            checkpoint_format: CheckpointFormat::default(),
            continue_train: false,
            which_epoch: default_which_epoch(),
            seed: 0,
            log_every: default_log_every(),
            patience: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lr() -> f32 {
    0.001
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_eps() -> f32 {
    1.0
}

fn default_weight_decay() -> f32 {
    0.0625
}

fn default_epochs() -> usize {
    10
}

fn default_beta() -> f32 {
    500.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_save_every() -> usize {
    5
}

fn default_which_epoch() -> String {
    "latest".to_string()
}

fn default_log_every() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distill::CsLossMode;

    #[test]
    fn test_deserialize_minimal_config() {
        let yaml = r#"
model:
  student:
    hidden: [32, 16]

data:
  train: train.json
  batch_size: 8
  input_dim: 64
"#;
        let spec: TrainSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.model.student.hidden, vec![32, 16]);
        assert!(!spec.is_distilling());
        assert!(spec.data.shuffle);
        assert_eq!(spec.optimizer, OptimSpec::default());
        assert_eq!(spec.optimizer.eps, 1.0);
        assert_eq!(spec.optimizer.weight_decay, 0.0625);
        assert_eq!(spec.training.epochs, 10);
        assert_eq!(spec.training.beta, 500.0);
        assert_eq!(spec.training.which_epoch, "latest");
        assert_eq!(spec.training.lr_policy, LrPolicy::Linear);
    }

    #[test]
    fn test_deserialize_distillation_config() {
        let yaml = r#"
model:
  student:
    hidden: [16, 8]
    dropout: 0.5
  teacher:
    network:
      hidden: [64, 32]
    weights: teacher/latest_net_G.json

data:
  train: train.json
  val: val.json
  batch_size: 4
  input_dim: 12
  mean_image: mean_image.json
  shuffle: false

optimizer:
  lr: 0.0005
  beta1: 0.5

distill:
  hint_modules: [1]
  cs_modules: [0, 1]
  cs_loss: mse
  cs_weight: 0.1

training:
  epochs: 40
  niter_decay: 20
  lr_policy: cosine
  grad_clip: 5.0
  checkpoint_format: safetensors
  patience: 3
"#;
        let spec: TrainSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.is_distilling());
        let teacher = spec.model.teacher.as_ref().unwrap();
        assert_eq!(teacher.network.hidden, vec![64, 32]);
        assert_eq!(spec.optimizer.beta1, 0.5);
        assert_eq!(spec.optimizer.beta2, 0.999);

        let distill = spec.distill_config();
        assert_eq!(distill.selection.hint_modules, vec![1]);
        assert_eq!(distill.cs_loss, CsLossMode::Mse);
        assert_eq!(distill.hint_weight, 1.0);

        assert_eq!(spec.training.lr_policy, LrPolicy::Cosine);
        assert_eq!(spec.training.checkpoint_format, CheckpointFormat::SafeTensors);
        assert_eq!(spec.training.patience, Some(3));
        assert!(!spec.data.shuffle);
    }

    #[test]
    fn test_serialize_round_trip_keeps_teacher() {
        let yaml = r#"
model:
  student: {hidden: [4]}
  teacher: {network: {hidden: [8]}, weights: t.json}
data: {train: a.json, batch_size: 2, input_dim: 3}
"#;
        let spec: TrainSpec = serde_yaml::from_str(yaml).unwrap();
        let text = serde_yaml::to_string(&spec).unwrap();
        assert!(text.contains("teacher"));
        let again: TrainSpec = serde_yaml::from_str(&text).unwrap();
        assert!(again.is_distilling());
    }
}
