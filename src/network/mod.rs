//! Pose regression networks
//!
//! The training loop only talks to networks through [`PoseNetwork`]: a forward
//! pass yields the pose prediction together with the intermediate feature maps
//! the distillation losses compare. [`MlpPoseNet`] is the dense reference
//! implementation used for both students and teachers.

mod layers;
mod mlp;

pub use layers::{linear, xavier_uniform};
pub use mlp::MlpPoseNet;

use crate::autograd::{Context, Tensor};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Width of the position output (x, y, z)
pub const POSITION_DIM: usize = 3;
/// Width of the orientation output (quaternion)
pub const ORIENTATION_DIM: usize = 4;
/// Width of a ground-truth pose row
pub const POSE_DIM: usize = POSITION_DIM + ORIENTATION_DIM;

/// One intermediate activation, flattened per sample
#[derive(Debug, Clone)]
pub struct FeatureMap {
    /// Activation values, `rows × cols` row-major
    pub data: Tensor,
    /// Batch size
    pub rows: usize,
    /// Flattened feature width per sample
    pub cols: usize,
}

impl FeatureMap {
    pub fn new(data: Tensor, rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "feature map size mismatch");
        Self { data, rows, cols }
    }

    /// Copy without gradient history
    pub fn detach(&self) -> Self {
        Self {
            data: self.data.detach(),
            rows: self.rows,
            cols: self.cols,
        }
    }
}

/// Output of a pose network forward pass
#[derive(Debug, Clone)]
pub struct PoseOutput {
    /// Predicted positions, `batch × 3`
    pub position: Tensor,
    /// Predicted orientations (unnormalized quaternions), `batch × 4`
    pub orientation: Tensor,
    /// Intermediate feature maps in network order
    pub features: Vec<FeatureMap>,
}

/// A network mapping flattened images to poses and feature maps
pub trait PoseNetwork {
    /// Architecture name, recorded in checkpoints
    fn name(&self) -> &str;

    /// Flattened input width per sample
    fn input_dim(&self) -> usize;

    /// Width of each feature map returned by [`PoseNetwork::forward`]
    fn feature_dims(&self) -> Vec<usize>;

    /// Run the network on a `batch × input_dim` image matrix
    fn forward(&self, images: &Tensor, batch: usize, ctx: &Context) -> Result<PoseOutput>;

    /// Trainable parameters
    fn parameters(&self) -> &[Tensor];

    /// Trainable parameters, mutable for optimizer steps
    fn parameters_mut(&mut self) -> &mut [Tensor];

    /// Parameter names, aligned with [`PoseNetwork::parameters`]
    fn parameter_names(&self) -> Vec<String>;

    /// Stop tracking gradients for every parameter
    fn freeze(&mut self);

    /// Whether any parameter still tracks gradients
    fn is_frozen(&self) -> bool {
        self.parameters().iter().all(|p| !p.requires_grad())
    }

    /// Parameters paired with their names
    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        self.parameter_names()
            .into_iter()
            .zip(self.parameters().iter().cloned())
            .collect()
    }

    /// Overwrite parameters from `(name, values)` pairs
    ///
    /// Every parameter of the network must be present with a matching size.
    fn load_named(&mut self, named: &[(String, Tensor)]) -> Result<()> {
        let names = self.parameter_names();
        for (name, param) in names.iter().zip(self.parameters_mut().iter_mut()) {
            let (_, source) = named
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| Error::Checkpoint(format!("missing parameter '{name}'")))?;
            if source.len() != param.len() {
                return Err(Error::ShapeMismatch {
                    expected: vec![param.len()],
                    got: vec![source.len()],
                });
            }
            param.data_mut().assign(source.data());
        }
        Ok(())
    }

    /// Total number of scalar parameters
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(Tensor::len).sum()
    }
}

/// Declarative description of a reference network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Architecture name (only "mlp" is built in)
    #[serde(default = "default_arch")]
    pub arch: String,

    /// Hidden layer widths; each hidden layer emits one feature map
    pub hidden: Vec<usize>,

    /// Dropout probability before the regression heads (training only)
    #[serde(default)]
    pub dropout: f32,
}

fn default_arch() -> String {
    "mlp".to_string()
}

/// Build a network from its spec
pub fn define_network(
    spec: &NetworkSpec,
    input_dim: usize,
    seed: u64,
) -> Result<Box<dyn PoseNetwork>> {
    match spec.arch.as_str() {
        "mlp" => Ok(Box::new(MlpPoseNet::new(
            input_dim,
            &spec.hidden,
            spec.dropout,
            seed,
        )?)),
        other => Err(Error::ConfigError(format!(
            "unknown network architecture '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_network_mlp() {
        let spec = NetworkSpec {
            arch: "mlp".to_string(),
            hidden: vec![8, 4],
            dropout: 0.0,
        };
        let net = define_network(&spec, 6, 1).unwrap();
        assert_eq!(net.input_dim(), 6);
        assert_eq!(net.feature_dims(), vec![8, 4]);
    }

    #[test]
    fn test_define_network_unknown_arch() {
        let spec = NetworkSpec {
            arch: "resnet".to_string(),
            hidden: vec![8],
            dropout: 0.0,
        };
        assert!(matches!(
            define_network(&spec, 6, 1),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_named_rejects_missing_parameter() {
        let mut net = MlpPoseNet::new(4, &[3], 0.0, 0).unwrap();
        let mut named = net.named_parameters();
        named.pop();
        assert!(matches!(net.load_named(&named), Err(Error::Checkpoint(_))));
    }

    #[test]
    fn test_load_named_copies_values() {
        let source = MlpPoseNet::new(4, &[3], 0.0, 7).unwrap();
        let mut target = MlpPoseNet::new(4, &[3], 0.0, 8).unwrap();
        target.load_named(&source.named_parameters()).unwrap();

        for (a, b) in source.parameters().iter().zip(target.parameters()) {
            assert_eq!(a.data(), b.data());
        }
    }

    #[test]
    fn test_network_spec_yaml_defaults() {
        let spec: NetworkSpec = serde_yaml::from_str("hidden: [16, 8]").unwrap();
        assert_eq!(spec.arch, "mlp");
        assert_eq!(spec.dropout, 0.0);
    }
}
