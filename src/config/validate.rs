//! Configuration validation

use super::schema::TrainSpec;
use crate::network::NetworkSpec;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Training data path does not exist: {0}")]
    TrainDataNotFound(String),

    #[error("Validation data path does not exist: {0}")]
    ValDataNotFound(String),

    #[error("Mean image path does not exist: {0}")]
    MeanImageNotFound(String),

    #[error("Teacher weights do not exist: {0}")]
    TeacherWeightsNotFound(String),

    #[error("Student init weights do not exist: {0}")]
    StudentInitNotFound(String),

    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid Adam betas: ({0}, {1}) (each must be in [0, 1))")]
    InvalidBetas(f32, f32),

    #[error("Invalid Adam epsilon: {0} (must be > 0.0)")]
    InvalidEpsilon(f32),

    #[error("Invalid weight decay: {0} (must be >= 0.0)")]
    InvalidWeightDecay(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid input dimension: {0} (must be > 0)")]
    InvalidInputDim(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid niter_decay: {niter_decay} (must be <= epochs = {epochs})")]
    InvalidNiterDecay { niter_decay: usize, epochs: usize },

    #[error("Invalid beta: {0} (must be >= 0.0)")]
    InvalidBeta(f32),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid log interval: {0} (must be > 0)")]
    InvalidLogEvery(usize),

    #[error("Invalid {role} network: {reason}")]
    InvalidNetwork { role: String, reason: String },

    #[error("Distillation modules configured without a teacher network")]
    DistillWithoutTeacher,

    #[error("Invalid distillation weight {name}: {value} (must be >= 0.0)")]
    InvalidDistillWeight { name: String, value: f32 },

    #[error("Invalid distillation temperature: {0} (must be > 0.0)")]
    InvalidTemperature(f32),

    #[error("Feature module {module} out of range: {role} network has {available} feature maps")]
    ModuleOutOfRange {
        module: usize,
        role: String,
        available: usize,
    },
}

fn validate_network(spec: &NetworkSpec, role: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidNetwork {
        role: role.to_string(),
        reason,
    };
    if spec.arch != "mlp" {
        return Err(invalid(format!("unknown architecture '{}'", spec.arch)));
    }
    if spec.hidden.is_empty() || spec.hidden.contains(&0) {
        return Err(invalid(format!(
            "hidden widths must be non-empty and positive, got {:?}",
            spec.hidden
        )));
    }
    if !(0.0..1.0).contains(&spec.dropout) {
        return Err(invalid(format!("dropout {} not in [0, 1)", spec.dropout)));
    }
    Ok(())
}

/// Validate a training specification
///
/// Checks value ranges and the consistency of the distillation setup. File
/// existence is checked separately by [`validate_paths`].
pub fn validate_config(spec: &TrainSpec) -> Result<(), ValidationError> {
    if spec.data.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(spec.data.batch_size));
    }
    if spec.data.input_dim == 0 {
        return Err(ValidationError::InvalidInputDim(spec.data.input_dim));
    }

    let opt = &spec.optimizer;
    if opt.lr <= 0.0 {
        return Err(ValidationError::InvalidLearningRate(opt.lr));
    }
    if !(0.0..1.0).contains(&opt.beta1) || !(0.0..1.0).contains(&opt.beta2) {
        return Err(ValidationError::InvalidBetas(opt.beta1, opt.beta2));
    }
    if opt.eps <= 0.0 {
        return Err(ValidationError::InvalidEpsilon(opt.eps));
    }
    if opt.weight_decay < 0.0 {
        return Err(ValidationError::InvalidWeightDecay(opt.weight_decay));
    }

    let training = &spec.training;
    if training.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(training.epochs));
    }
    if training.niter_decay > training.epochs {
        return Err(ValidationError::InvalidNiterDecay {
            niter_decay: training.niter_decay,
            epochs: training.epochs,
        });
    }
    if training.beta < 0.0 {
        return Err(ValidationError::InvalidBeta(training.beta));
    }
    if let Some(grad_clip) = training.grad_clip {
        if grad_clip <= 0.0 {
            return Err(ValidationError::InvalidGradClip(grad_clip));
        }
    }
    if training.log_every == 0 {
        return Err(ValidationError::InvalidLogEvery(training.log_every));
    }

    validate_network(&spec.model.student, "student")?;
    if let Some(teacher) = &spec.model.teacher {
        validate_network(&teacher.network, "teacher")?;
    }

    if let Some(distill) = &spec.distill {
        let selection = &distill.selection;
        let uses_modules = !selection.hint_modules.is_empty() || !selection.cs_modules.is_empty();
        let Some(teacher) = &spec.model.teacher else {
            return if uses_modules {
                Err(ValidationError::DistillWithoutTeacher)
            } else {
                Ok(())
            };
        };

        for (name, value) in [
            ("hint_weight", distill.hint_weight),
            ("cs_weight", distill.cs_weight),
        ] {
            if value < 0.0 {
                return Err(ValidationError::InvalidDistillWeight {
                    name: name.to_string(),
                    value,
                });
            }
        }
        if distill.temperature <= 0.0 {
            return Err(ValidationError::InvalidTemperature(distill.temperature));
        }

        let networks = [
            ("student", spec.model.student.hidden.len()),
            ("teacher", teacher.network.hidden.len()),
        ];
        for &module in selection.hint_modules.iter().chain(&selection.cs_modules) {
            for (role, available) in networks {
                if module >= available {
                    return Err(ValidationError::ModuleOutOfRange {
                        module,
                        role: role.to_string(),
                        available,
                    });
                }
            }
        }
    }

    Ok(())
}

/// Check that every input file referenced by the spec exists
pub fn validate_paths(spec: &TrainSpec) -> Result<(), ValidationError> {
    if !spec.data.train.exists() {
        return Err(ValidationError::TrainDataNotFound(
            spec.data.train.display().to_string(),
        ));
    }
    if let Some(val) = &spec.data.val {
        if !val.exists() {
            return Err(ValidationError::ValDataNotFound(val.display().to_string()));
        }
    }
    if let Some(mean) = &spec.data.mean_image {
        if !mean.exists() {
            return Err(ValidationError::MeanImageNotFound(
                mean.display().to_string(),
            ));
        }
    }
    if let Some(teacher) = &spec.model.teacher {
        if !teacher.weights.exists() {
            return Err(ValidationError::TeacherWeightsNotFound(
                teacher.weights.display().to_string(),
            ));
        }
    }
    if let Some(init) = &spec.model.student_init {
        if !init.exists() {
            return Err(ValidationError::StudentInitNotFound(
                init.display().to_string(),
            ));
        }
    }
    Ok(())
}
