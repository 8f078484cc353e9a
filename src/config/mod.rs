//! Declarative YAML configuration
//!
//! A training run is described by one YAML file:
//!
//! ```yaml
//! model:
//!   student:
//!     hidden: [256, 128]
//!     dropout: 0.5
//!   teacher:
//!     network:
//!       hidden: [1024, 512]
//!     weights: teacher/latest_net_G.json
//!
//! data:
//!   train: data/train.json
//!   val: data/val.json
//!   batch_size: 32
//!   input_dim: 4096
//!   mean_image: data/mean_image.json
//!
//! optimizer:
//!   lr: 0.001
//!   beta1: 0.9
//!
//! distill:
//!   hint_modules: [1]
//!   cs_modules: [0, 1]
//!   cs_loss: kl
//!
//! training:
//!   epochs: 100
//!   niter_decay: 50
//!   beta: 500
//! ```
//!
//! Without `model.teacher` the student is trained on the pose loss alone.

mod cli;
mod schema;
mod train;
mod validate;


pub use cli::{
    apply_overrides, parse_args, Cli, Command, EvaluateArgs, InfoArgs, OutputFormat, TrainArgs,
    ValidateArgs,
};
pub use schema::{
    DataConfig, LrPolicy, ModelSpec, OptimSpec, TeacherSpec, TrainSpec, TrainingParams,
};
pub use train::{
    build_scheduler, evaluate_from_spec, load_config, parse_config, train_from_spec,
    train_from_yaml,
};
pub use validate::{validate_config, validate_paths, ValidationError};
