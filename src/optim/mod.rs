//! Optimizers for training the student network

mod adam;
mod optimizer;
mod scheduler;

pub use adam::Adam;
pub use optimizer::{clip_grad_norm, Optimizer};
pub use scheduler::{CosineAnnealingLR, LRScheduler, LinearDecayLR};
