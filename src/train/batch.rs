//! Training batch

use crate::network::POSE_DIM;
use crate::{Error, Result, Tensor};
use ndarray::{Array1, Array2, Axis};

/// A batch of flattened images with their ground-truth poses
///
/// `poses` rows are `[x, y, z, qw, qx, qy, qz]`.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Images, `batch × input_dim`
    pub images: Array2<f32>,
    /// Ground-truth poses, `batch × 7`
    pub poses: Array2<f32>,
    /// Source image paths, one per row
    pub paths: Vec<String>,
}

impl Batch {
    /// Create a batch, checking row counts and pose width
    pub fn new(images: Array2<f32>, poses: Array2<f32>, paths: Vec<String>) -> Result<Self> {
        if poses.ncols() != POSE_DIM || poses.nrows() != images.nrows() {
            return Err(Error::ShapeMismatch {
                expected: vec![images.nrows(), POSE_DIM],
                got: poses.shape().to_vec(),
            });
        }
        if paths.len() != images.nrows() {
            return Err(Error::InvalidParameter(format!(
                "{} image paths for {} samples",
                paths.len(),
                images.nrows()
            )));
        }
        Ok(Self {
            images,
            poses,
            paths,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.images.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened image width
    pub fn input_dim(&self) -> usize {
        self.images.ncols()
    }

    /// Subtract the dataset mean image from every sample
    pub fn center(&mut self, mean_image: &Array1<f32>) -> Result<()> {
        if mean_image.len() != self.input_dim() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.input_dim()],
                got: vec![mean_image.len()],
            });
        }
        for mut row in self.images.axis_iter_mut(Axis(0)) {
            row -= mean_image;
        }
        Ok(())
    }

    /// Images as a row-major tensor without gradient tracking
    pub fn images_tensor(&self) -> Tensor {
        Tensor::from_vec(self.images.iter().copied().collect(), false)
    }

    /// Poses as a row-major tensor without gradient tracking
    pub fn poses_tensor(&self) -> Tensor {
        Tensor::from_vec(self.poses.iter().copied().collect(), false)
    }
}
