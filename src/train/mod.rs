//! Pose regression training
//!
//! This module provides:
//! - [`Batch`]: images and `batch × 7` ground-truth poses
//! - [`PoseModel`]: student, optional frozen teacher, objective and optimizers
//! - [`PoseTrainer`]: the epoch loop with scheduling, validation and callbacks
//! - [`evaluate`]: position and orientation error of a trained student
//!
//! # Example
//!
//! ```no_run
//! use posekd::network::MlpPoseNet;
//! use posekd::train::{ModelOptions, PoseModel, PoseTrainer, TrainConfig};
//!
//! let student = Box::new(MlpPoseNet::new(64, &[32, 16], 0.0, 0).unwrap());
//! let teacher = Box::new(MlpPoseNet::new(64, &[128, 64], 0.0, 0).unwrap());
//! let model = PoseModel::new(student, Some(teacher), ModelOptions::default()).unwrap();
//!
//! let mut trainer = PoseTrainer::new(model, TrainConfig::default().with_save_every(5));
//! // let result = trainer.train(20, |epoch| batches(&dataset, 16, true, epoch as u64), None)?;
//! ```

mod batch;
pub mod callback;
mod config;
mod eval;
mod model;
mod trainer;

pub use batch::Batch;
pub use callback::{
    CallbackAction, CallbackContext, CallbackManager, CheckpointCallback, EarlyStopping,
    ProgressCallback, TrainerCallback, BEST_LABEL, LATEST_LABEL,
};
pub use config::{EpochLosses, MetricsTracker, TrainConfig};
pub use eval::{evaluate, pose_error, pose_errors, EvalSummary, PoseError};
pub use model::{CurrentErrors, ModelOptions, PoseModel, STUDENT_NAME};
pub use trainer::{PoseTrainer, TrainResult};
