//! # posekd: pose regression with knowledge distillation
//!
//! posekd trains a small pose-regression network (the student) to predict a
//! camera pose (3-d position plus orientation quaternion) from an image. A
//! larger frozen network (the teacher) can guide training through two extra
//! terms: a feature-hint loss between selected feature maps, and a
//! cross-similarity loss comparing how each network's batch self-similarity
//! relates to the self-similarity of the ground-truth poses.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation
//! - **network**: Pose networks exposing intermediate feature maps
//! - **distill**: Hint, self-similarity and cross-similarity losses
//! - **optim**: Adam, gradient clipping and learning-rate schedules
//! - **data**: Pose datasets and mini-batching
//! - **train**: Model lifecycle, epoch loop, callbacks and evaluation
//! - **io**: Network checkpoints (JSON, YAML, SafeTensors)
//! - **config**: Declarative YAML configuration and the CLI
//! - **logging**: Tracing subscriber setup

pub mod autograd;
pub mod config;
pub mod data;
pub mod distill;
pub mod io;
pub mod logging;
pub mod network;
pub mod optim;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Context, Tensor};
pub use error::{Error, Result};
