//! Pose datasets

use crate::network::POSE_DIM;
use crate::{Error, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One labeled image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Where the image came from, reported back by the model
    pub path: String,
    /// Flattened image values
    pub image: Vec<f32>,
    /// Ground-truth pose `[x, y, z, qw, qx, qy, qz]`
    pub pose: Vec<f32>,
}

/// Random-access collection of pose samples
pub trait PoseDataset {
    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `index`, if any
    fn get(&self, index: usize) -> Option<&PoseSample>;

    /// Flattened image width shared by all samples
    fn input_dim(&self) -> usize;

    /// Mean image to subtract from inputs, when the dataset provides one
    fn mean_image(&self) -> Option<&Array1<f32>> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct DatasetFile {
    samples: Vec<PoseSample>,
    #[serde(default)]
    mean_image: Option<Vec<f32>>,
}

/// Dataset held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    samples: Vec<PoseSample>,
    input_dim: usize,
    mean_image: Option<Array1<f32>>,
}

impl InMemoryDataset {
    /// Build a dataset, checking that every sample has the same image width
    /// and a 7-value pose
    pub fn new(samples: Vec<PoseSample>, mean_image: Option<Vec<f32>>) -> Result<Self> {
        let input_dim = samples.first().map(|s| s.image.len()).unwrap_or(0);
        for sample in &samples {
            if sample.image.len() != input_dim || input_dim == 0 {
                return Err(Error::ShapeMismatch {
                    expected: vec![input_dim],
                    got: vec![sample.image.len()],
                });
            }
            if sample.pose.len() != POSE_DIM {
                return Err(Error::ShapeMismatch {
                    expected: vec![POSE_DIM],
                    got: vec![sample.pose.len()],
                });
            }
        }

        let mean_image = match mean_image {
            Some(mean) if !samples.is_empty() && mean.len() != input_dim => {
                return Err(Error::ShapeMismatch {
                    expected: vec![input_dim],
                    got: vec![mean.len()],
                })
            }
            other => other.map(Array1::from_vec),
        };

        Ok(Self {
            samples,
            input_dim,
            mean_image,
        })
    }

    /// Load `{"samples": [{"path", "image", "pose"}], "mean_image": [...]}`
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: DatasetFile = serde_json::from_str(&content).map_err(|e| {
            Error::Serialization(format!("invalid dataset {}: {e}", path.display()))
        })?;
        Self::new(file.samples, file.mean_image)
    }

    /// Replace the mean image, e.g. with one loaded from a separate file
    pub fn with_mean_image(mut self, mean: Array1<f32>) -> Result<Self> {
        if !self.samples.is_empty() && mean.len() != self.input_dim {
            return Err(Error::ShapeMismatch {
                expected: vec![self.input_dim],
                got: vec![mean.len()],
            });
        }
        self.mean_image = Some(mean);
        Ok(self)
    }

    /// Fail unless images have the width a network expects
    pub fn expect_input_dim(&self, input_dim: usize) -> Result<()> {
        if !self.samples.is_empty() && self.input_dim != input_dim {
            return Err(Error::ShapeMismatch {
                expected: vec![input_dim],
                got: vec![self.input_dim],
            });
        }
        Ok(())
    }
}

impl PoseDataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Option<&PoseSample> {
        self.samples.get(index)
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn mean_image(&self) -> Option<&Array1<f32>> {
        self.mean_image.as_ref()
    }
}

/// Read a mean image stored as a JSON array of floats
pub fn load_mean_image(path: impl AsRef<Path>) -> Result<Array1<f32>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let values: Vec<f32> = serde_json::from_str(&content).map_err(|e| {
        Error::Serialization(format!("invalid mean image {}: {e}", path.display()))
    })?;
    Ok(Array1::from_vec(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(path: &str, image: Vec<f32>) -> PoseSample {
        PoseSample {
            path: path.to_string(),
            image,
            pose: vec![0.0, 1.0, 2.0, 1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_new_validates_image_width() {
        let result = InMemoryDataset::new(
            vec![sample("a", vec![1.0, 2.0]), sample("b", vec![1.0])],
            None,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_new_validates_pose_width() {
        let mut bad = sample("a", vec![1.0]);
        bad.pose.pop();
        assert!(InMemoryDataset::new(vec![bad], None).is_err());
    }

    #[test]
    fn test_new_validates_mean_width() {
        let result = InMemoryDataset::new(vec![sample("a", vec![1.0, 2.0])], Some(vec![0.0]));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(
            &path,
            r#"{
                "samples": [
                    {"path": "seq1/frame0.png", "image": [0.5, 0.25, 1.0], "pose": [1, 2, 3, 1, 0, 0, 0]},
                    {"path": "seq1/frame1.png", "image": [0.0, 0.75, 1.0], "pose": [1, 2, 4, 0, 1, 0, 0]}
                ],
                "mean_image": [0.25, 0.5, 1.0]
            }"#,
        )
        .unwrap();

        let dataset = InMemoryDataset::from_json(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.input_dim(), 3);
        assert_eq!(dataset.get(1).unwrap().path, "seq1/frame1.png");
        assert_eq!(dataset.mean_image().unwrap().len(), 3);
        assert!(dataset.expect_input_dim(3).is_ok());
        assert!(dataset.expect_input_dim(4).is_err());
    }

    #[test]
    fn test_from_json_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"{"samples": 3}"#).unwrap();
        assert!(matches!(
            InMemoryDataset::from_json(&path),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_load_mean_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mean_image.json");
        std::fs::write(&path, "[0.1, 0.2]").unwrap();

        let mean = load_mean_image(&path).unwrap();
        let dataset = InMemoryDataset::new(vec![sample("a", vec![1.0, 2.0])], None)
            .unwrap()
            .with_mean_image(mean)
            .unwrap();
        assert!(dataset.mean_image().is_some());
    }
}
