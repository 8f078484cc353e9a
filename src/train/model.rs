//! Pose regression model with optional teacher guidance

use super::eval::{pose_errors, PoseError};
use super::Batch;
use crate::autograd::{backward, Context};
use crate::config::{OptimSpec, TrainSpec};
use crate::distill::{
    supervised_objective, DistillConfig, DistillationObjective, LossBreakdown, TeacherFeatures,
};
use crate::io::{
    load_checkpoint, load_network, network_filename, save_checkpoint, save_network, Checkpoint,
    CheckpointFormat, CheckpointMetadata,
};
use crate::network::{
    define_network, PoseNetwork, PoseOutput, ORIENTATION_DIM, POSE_DIM, POSITION_DIM,
};
use crate::optim::{clip_grad_norm, Adam, Optimizer};
use crate::{Error, Result, Tensor};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Name under which the trained network is checkpointed
pub const STUDENT_NAME: &str = "G";

const ADAPTER_NAME: &str = "hint_adapters";

/// Settings a [`PoseModel`] needs besides its networks
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub optimizer: OptimSpec,
    pub distill: DistillConfig,
    /// Weight of the orientation term
    pub beta: f32,
    pub grad_clip: Option<f32>,
    pub output_dir: PathBuf,
    pub checkpoint_format: CheckpointFormat,
    pub seed: u64,
}

impl ModelOptions {
    pub fn from_spec(spec: &TrainSpec) -> Self {
        Self {
            optimizer: spec.optimizer.clone(),
            distill: spec.distill_config(),
            beta: spec.training.beta,
            grad_clip: spec.training.grad_clip,
            output_dir: spec.training.output_dir.clone(),
            checkpoint_format: spec.training.checkpoint_format,
            seed: spec.training.seed,
        }
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            optimizer: OptimSpec::default(),
            distill: DistillConfig::default(),
            beta: 500.0,
            grad_clip: None,
            output_dir: PathBuf::from("./checkpoints"),
            checkpoint_format: CheckpointFormat::default(),
            seed: 0,
        }
    }
}

/// Errors reported for the current batch
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentErrors {
    /// After a training step: position loss and β-weighted orientation loss
    Train { position: f32, orientation: f32 },
    /// After [`PoseModel::test`]: per-sample pose errors
    Test(Vec<PoseError>),
}

struct Input {
    images: Tensor,
    poses: Tensor,
    batch: usize,
    paths: Vec<String>,
}

/// Student network, optional frozen teacher, their objective and optimizers
///
/// Follows a set-input / forward / backward lifecycle:
///
/// ```text
/// set_input(batch) -> forward() -> backward()   (optimize_parameters does all three)
/// set_input(batch) -> test()                    (evaluation, no gradients)
/// ```
pub struct PoseModel {
    student: Box<dyn PoseNetwork>,
    teacher: Option<Box<dyn PoseNetwork>>,
    objective: Option<DistillationObjective>,
    optimizer: Adam,
    adapter_optimizer: Adam,
    options: ModelOptions,
    input: Option<Input>,
    output: Option<PoseOutput>,
    teacher_features: Option<TeacherFeatures>,
    loss: Option<LossBreakdown>,
    testing: bool,
}

fn build_adam(spec: &OptimSpec) -> Adam {
    Adam::new(spec.lr, spec.beta1, spec.beta2, spec.eps).with_weight_decay(spec.weight_decay)
}

impl PoseModel {
    /// Assemble a model from ready networks
    ///
    /// The teacher, when given, is frozen here and must accept the same
    /// inputs as the student.
    pub fn new(
        student: Box<dyn PoseNetwork>,
        teacher: Option<Box<dyn PoseNetwork>>,
        options: ModelOptions,
    ) -> Result<Self> {
        let (teacher, objective) = match teacher {
            Some(mut teacher) => {
                if teacher.input_dim() != student.input_dim() {
                    return Err(Error::ShapeMismatch {
                        expected: vec![student.input_dim()],
                        got: vec![teacher.input_dim()],
                    });
                }
                teacher.freeze();
                let objective = DistillationObjective::new(
                    &options.distill,
                    &student.feature_dims(),
                    &teacher.feature_dims(),
                    options.seed.wrapping_add(1),
                )?;
                (Some(teacher), Some(objective))
            }
            None => (None, None),
        };

        info!(
            student = student.name(),
            student_params = student.num_parameters(),
            teacher_params = teacher.as_ref().map(|t| t.num_parameters()).unwrap_or(0),
            adapter_params = objective
                .as_ref()
                .map(|o| o.adapters().parameters().iter().map(Tensor::len).sum::<usize>())
                .unwrap_or(0),
            "networks initialized"
        );

        Ok(Self {
            student,
            teacher,
            objective,
            optimizer: build_adam(&options.optimizer),
            adapter_optimizer: build_adam(&options.optimizer),
            options,
            input: None,
            output: None,
            teacher_features: None,
            loss: None,
            testing: false,
        })
    }

    /// Build networks from a spec, loading teacher weights and initializing
    /// or resuming the student when requested
    ///
    /// `student_init` seeds the student unless a plain run resumes from its
    /// own checkpoint, which then takes precedence.
    pub fn from_spec(spec: &TrainSpec) -> Result<Self> {
        let input_dim = spec.data.input_dim;
        let seed = spec.training.seed;
        let mut student = define_network(&spec.model.student, input_dim, seed)?;

        let teacher = match &spec.model.teacher {
            Some(teacher_spec) => {
                let mut teacher = define_network(&teacher_spec.network, input_dim, seed)?;
                load_network(teacher.as_mut(), &teacher_spec.weights)?;
                info!(weights = %teacher_spec.weights.display(), "teacher weights loaded");
                Some(teacher)
            }
            None => None,
        };

        let training = &spec.training;
        let resuming = training.continue_train && teacher.is_none();
        if let Some(init) = spec.model.student_init.as_ref().filter(|_| !resuming) {
            load_network(student.as_mut(), init)?;
            info!(init = %init.display(), "student initialized");
        }
        if training.continue_train {
            if teacher.is_some() {
                warn!("continue_train is ignored while distilling; the student starts fresh");
            } else {
                let path = training.output_dir.join(network_filename(
                    &training.which_epoch,
                    STUDENT_NAME,
                    training.checkpoint_format,
                ));
                load_network(student.as_mut(), &path)?;
                info!(label = %training.which_epoch, "resumed student");
            }
        }

        Self::new(student, teacher, ModelOptions::from_spec(spec))
    }

    /// Whether a teacher guides training
    pub fn is_distilling(&self) -> bool {
        self.teacher.is_some()
    }

    pub fn student(&self) -> &dyn PoseNetwork {
        self.student.as_ref()
    }

    pub fn teacher(&self) -> Option<&dyn PoseNetwork> {
        self.teacher.as_deref()
    }

    pub fn objective(&self) -> Option<&DistillationObjective> {
        self.objective.as_ref()
    }

    pub fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    /// Set the rate of the student and adapter optimizers
    pub fn set_lr(&mut self, lr: f32) {
        self.optimizer.set_lr(lr);
        self.adapter_optimizer.set_lr(lr);
    }

    /// Loss of the last backward pass
    pub fn last_loss(&self) -> Option<&LossBreakdown> {
        self.loss.as_ref()
    }

    /// Load a batch as the current input
    pub fn set_input(&mut self, batch: &Batch) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::InvalidParameter("empty batch".to_string()));
        }
        if batch.input_dim() != self.student.input_dim() {
            return Err(Error::ShapeMismatch {
                expected: vec![batch.len(), self.student.input_dim()],
                got: vec![batch.len(), batch.input_dim()],
            });
        }
        self.input = Some(Input {
            images: batch.images_tensor(),
            poses: batch.poses_tensor(),
            batch: batch.len(),
            paths: batch.paths.clone(),
        });
        self.output = None;
        self.teacher_features = None;
        self.loss = None;
        Ok(())
    }

    fn input(&self) -> Result<&Input> {
        self.input
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("set_input must be called first".to_string()))
    }

    /// Training-mode forward pass of the student, plus teacher features when distilling
    pub fn forward(&mut self) -> Result<()> {
        let input = self.input()?;
        let output = self
            .student
            .forward(&input.images, input.batch, &Context::new())?;

        let teacher_features = match (&self.teacher, &self.objective) {
            (Some(teacher), Some(objective)) => Some(TeacherFeatures::extract(
                teacher.as_ref(),
                &input.images,
                input.batch,
                objective.selection(),
            )?),
            _ => None,
        };

        self.output = Some(output);
        self.teacher_features = teacher_features;
        self.testing = false;
        Ok(())
    }

    /// Assemble the objective for the current forward pass and backpropagate it
    pub fn backward(&mut self) -> Result<()> {
        let input = self.input()?;
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("forward must run before backward".to_string()))?;

        let mut loss = match (&self.objective, &self.teacher_features) {
            (Some(objective), Some(features)) => objective.compute(
                output,
                features,
                &input.poses,
                input.batch,
                self.options.beta,
            )?,
            _ => supervised_objective(output, &input.poses, input.batch, self.options.beta)?,
        };

        backward(&mut loss.total, None);
        self.loss = Some(loss);
        Ok(())
    }

    fn zero_grad(&mut self) {
        self.optimizer.zero_grad(self.student.parameters_mut());
        if let Some(objective) = &mut self.objective {
            self.adapter_optimizer
                .zero_grad(objective.adapters_mut().parameters_mut());
        }
    }

    /// Parameters trained by this model (student, then hint adapters)
    pub fn trainable_parameters(&self) -> Vec<Tensor> {
        let mut params = self.student.parameters().to_vec();
        if let Some(objective) = &self.objective {
            params.extend(objective.adapters().parameters().iter().cloned());
        }
        params
    }

    /// One optimization step on `batch`; returns its loss breakdown
    pub fn optimize_parameters(&mut self, batch: &Batch) -> Result<LossBreakdown> {
        self.set_input(batch)?;
        self.forward()?;
        self.zero_grad();
        self.backward()?;

        if let Some(max_norm) = self.options.grad_clip {
            // Clones share gradient storage, so clipping them clips the originals
            let norm = clip_grad_norm(&mut self.trainable_parameters(), max_norm);
            debug!(norm, max_norm, "gradient norm");
        }

        self.optimizer.step(self.student.parameters_mut());
        if let Some(objective) = &mut self.objective {
            self.adapter_optimizer
                .step(objective.adapters_mut().parameters_mut());
        }

        self.loss
            .clone()
            .ok_or_else(|| Error::InvalidParameter("backward produced no loss".to_string()))
    }

    /// Evaluation-mode forward pass without gradient tracking
    pub fn test(&mut self) -> Result<()> {
        let input = self.input()?;
        let output = Context::inference()
            .no_grad(|ctx| self.student.forward(&input.images, input.batch, ctx))?;

        self.output = Some(output);
        self.teacher_features = None;
        self.loss = None;
        self.testing = true;
        Ok(())
    }

    /// Per-sample errors of the last [`PoseModel::test`] call
    pub fn test_errors(&self) -> Result<Vec<PoseError>> {
        let input = self.input()?;
        match (&self.output, self.testing) {
            (Some(output), true) => pose_errors(output, &input.poses, input.batch),
            _ => Err(Error::InvalidParameter(
                "test must run before reading test errors".to_string(),
            )),
        }
    }

    /// Errors for the current batch, depending on the last pass that ran
    pub fn current_errors(&self) -> Result<CurrentErrors> {
        if self.testing {
            return self.test_errors().map(CurrentErrors::Test);
        }
        self.loss
            .as_ref()
            .map(|loss| CurrentErrors::Train {
                position: loss.position,
                orientation: loss.orientation,
            })
            .ok_or_else(|| Error::InvalidParameter("no pass has run on this input".to_string()))
    }

    /// Predicted pose of the first sample: position then quaternion
    pub fn current_pose(&self) -> Option<[f32; POSE_DIM]> {
        let output = self.output.as_ref()?;
        let position = output.position.data();
        let orientation = output.orientation.data();
        if position.len() < POSITION_DIM || orientation.len() < ORIENTATION_DIM {
            return None;
        }

        let mut pose = [0.0; POSE_DIM];
        let first = position
            .iter()
            .take(POSITION_DIM)
            .chain(orientation.iter().take(ORIENTATION_DIM));
        for (slot, value) in pose.iter_mut().zip(first) {
            *slot = *value;
        }
        Some(pose)
    }

    /// Source paths of the current batch
    pub fn image_paths(&self) -> &[String] {
        self.input.as_ref().map(|i| i.paths.as_slice()).unwrap_or(&[])
    }

    /// Checkpoint the student (and hint adapters, if any) under `label`
    ///
    /// Returns the student checkpoint path. [`PoseModel::from_spec`] starts
    /// distillation runs fresh, so adapters only come back through
    /// [`PoseModel::load_adapters`].
    pub fn save(&self, label: &str) -> Result<PathBuf> {
        let dir = &self.options.output_dir;
        let format = self.options.checkpoint_format;
        let path = save_network(self.student.as_ref(), dir, label, STUDENT_NAME, format)?;

        if let Some(objective) = &self.objective {
            let adapters = objective.adapters().named_parameters();
            if !adapters.is_empty() {
                let checkpoint = Checkpoint::new(
                    CheckpointMetadata::new(ADAPTER_NAME, "linear", label),
                    adapters,
                );
                save_checkpoint(
                    &checkpoint,
                    dir.join(network_filename(label, ADAPTER_NAME, format)),
                )?;
            }
        }
        Ok(path)
    }

    /// Restore hint adapters saved under `label` in the output directory
    pub fn load_adapters(&mut self, label: &str) -> Result<()> {
        let objective = self.objective.as_mut().ok_or_else(|| {
            Error::InvalidParameter("hint adapters need a teacher".to_string())
        })?;
        let path = self.options.output_dir.join(network_filename(
            label,
            ADAPTER_NAME,
            self.options.checkpoint_format,
        ));
        let checkpoint = load_checkpoint(&path)?;
        objective.adapters_mut().load_named(&checkpoint.parameters)?;
        info!(label, path = %path.display(), "hint adapters loaded");
        Ok(())
    }
}
