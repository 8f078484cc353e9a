//! Checkpoint structure for serialization

use crate::{Error, Result, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Checkpoint metadata describing the network and training progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Network role, e.g. "G" for the trained pose network
    pub name: String,

    /// Architecture name reported by the network
    pub architecture: String,

    /// Checkpoint label ("latest", an epoch number, "best")
    pub label: String,

    /// Flattened input width the network expects
    #[serde(default)]
    pub input_dim: usize,

    /// Feature map widths in network order
    #[serde(default)]
    pub feature_dims: Vec<usize>,

    /// Free-form extra fields
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new(
        name: impl Into<String>,
        architecture: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            label: label.into(),
            input_dim: 0,
            feature_dims: Vec::new(),
            custom: HashMap::new(),
        }
    }

    /// Add a custom metadata field
    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Information about one stored parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// On-disk layout of text checkpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub metadata: CheckpointMetadata,
    pub parameters: Vec<ParameterInfo>,
    /// All parameters, flattened in `parameters` order
    pub data: Vec<f32>,
}

/// Named parameters plus metadata
pub struct Checkpoint {
    pub metadata: CheckpointMetadata,
    pub parameters: Vec<(String, Tensor)>,
}

impl Checkpoint {
    pub fn new(metadata: CheckpointMetadata, parameters: Vec<(String, Tensor)>) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    /// Look up a parameter by name
    pub fn get_parameter(&self, name: &str) -> Option<&Tensor> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Total number of stored scalars
    pub fn num_values(&self) -> usize {
        self.parameters.iter().map(|(_, t)| t.len()).sum()
    }

    /// Flatten into the serializable layout
    pub fn to_state(&self) -> CheckpointState {
        let mut data = Vec::with_capacity(self.num_values());
        let parameters = self
            .parameters
            .iter()
            .map(|(name, tensor)| {
                data.extend(tensor.data().iter().copied());
                ParameterInfo {
                    name: name.clone(),
                    shape: vec![tensor.len()],
                    dtype: "f32".to_string(),
                }
            })
            .collect();

        CheckpointState {
            metadata: self.metadata.clone(),
            parameters,
            data,
        }
    }

    /// Rebuild from the serializable layout, checking the data length
    pub fn from_state(state: CheckpointState) -> Result<Self> {
        let expected: usize = state
            .parameters
            .iter()
            .map(|p| p.shape.iter().product::<usize>())
            .sum();
        if expected != state.data.len() {
            return Err(Error::Checkpoint(format!(
                "parameter table covers {expected} values but {} are stored",
                state.data.len()
            )));
        }

        let mut offset = 0;
        let parameters = state
            .parameters
            .into_iter()
            .map(|info| {
                let size: usize = info.shape.iter().product();
                let values = state.data[offset..offset + size].to_vec();
                offset += size;
                (info.name, Tensor::from_vec(values, false))
            })
            .collect();

        Ok(Self {
            metadata: state.metadata,
            parameters,
        })
    }
}
