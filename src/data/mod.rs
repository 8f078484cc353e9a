//! Pose datasets and batching
//!
//! Image decoding and augmentation happen upstream: samples arrive as
//! flattened float images paired with a 7-value pose.

mod dataset;
mod loader;

pub use dataset::{load_mean_image, InMemoryDataset, PoseDataset, PoseSample};
pub use loader::batches;
