//! Dense reference pose network

use super::layers::{linear, xavier_uniform};
use super::{FeatureMap, PoseNetwork, PoseOutput, ORIENTATION_DIM, POSITION_DIM};
use crate::autograd::{mul, relu, Context, Tensor};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// Multi-layer perceptron regressing position and orientation
///
/// Layout: `hidden.len()` ReLU layers, each of which is exposed as a feature
/// map, followed by a position head (3 outputs) and an orientation head
/// (4 outputs) reading the last hidden layer. Dropout, when enabled, is applied
/// to the head input in training mode.
pub struct MlpPoseNet {
    input_dim: usize,
    // (in_dim, out_dim) per layer: hidden layers, then position and orientation heads
    shapes: Vec<(usize, usize)>,
    // weight and bias per layer, interleaved
    params: Vec<Tensor>,
    dropout: f32,
    rng: RefCell<StdRng>,
}

impl MlpPoseNet {
    /// Create a network with Xavier-initialized weights and zero biases
    pub fn new(input_dim: usize, hidden: &[usize], dropout: f32, seed: u64) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidParameter(
                "network input dimension must be > 0".to_string(),
            ));
        }
        if hidden.is_empty() || hidden.contains(&0) {
            return Err(Error::InvalidParameter(format!(
                "hidden widths must be non-empty and positive, got {hidden:?}"
            )));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(Error::InvalidParameter(format!(
                "dropout must be in [0, 1), got {dropout}"
            )));
        }

        let mut shapes = Vec::with_capacity(hidden.len() + 2);
        let mut in_dim = input_dim;
        for &width in hidden {
            shapes.push((in_dim, width));
            in_dim = width;
        }
        shapes.push((in_dim, POSITION_DIM));
        shapes.push((in_dim, ORIENTATION_DIM));

        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = Vec::with_capacity(shapes.len() * 2);
        for &(fan_in, fan_out) in &shapes {
            params.push(Tensor::from_vec(xavier_uniform(&mut rng, fan_in, fan_out), true));
            params.push(Tensor::zeros(fan_out, true));
        }

        Ok(Self {
            input_dim,
            shapes,
            params,
            dropout,
            rng: RefCell::new(rng),
        })
    }

    fn num_hidden(&self) -> usize {
        self.shapes.len() - 2
    }

    /// Parameter view for one forward pass, honoring the context's grad flag
    fn param(&self, index: usize, ctx: &Context) -> Tensor {
        let p = &self.params[index];
        p.clone()
            .with_requires_grad(ctx.grad_enabled() && p.requires_grad())
    }

    fn layer(&self, layer: usize, x: &Tensor, rows: usize, ctx: &Context) -> Tensor {
        let (in_dim, out_dim) = self.shapes[layer];
        linear(
            x,
            &self.param(2 * layer, ctx),
            &self.param(2 * layer + 1, ctx),
            rows,
            in_dim,
            out_dim,
        )
    }

    fn apply_dropout(&self, x: &Tensor) -> Tensor {
        let keep = 1.0 - self.dropout;
        let mut rng = self.rng.borrow_mut();
        let mask: Vec<f32> = (0..x.len())
            .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
            .collect();
        mul(x, &Tensor::from_vec(mask, false))
    }
}

impl PoseNetwork for MlpPoseNet {
    fn name(&self) -> &str {
        "mlp"
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn feature_dims(&self) -> Vec<usize> {
        self.shapes[..self.num_hidden()]
            .iter()
            .map(|&(_, out)| out)
            .collect()
    }

    fn forward(&self, images: &Tensor, batch: usize, ctx: &Context) -> Result<PoseOutput> {
        if batch == 0 || images.len() != batch * self.input_dim {
            return Err(Error::ShapeMismatch {
                expected: vec![batch, self.input_dim],
                got: vec![images.len()],
            });
        }

        let mut features = Vec::with_capacity(self.num_hidden());
        let mut x = images.clone();
        for layer in 0..self.num_hidden() {
            x = relu(&self.layer(layer, &x, batch, ctx));
            features.push(FeatureMap::new(x.clone(), batch, self.shapes[layer].1));
        }

        if ctx.is_training() && self.dropout > 0.0 {
            x = self.apply_dropout(&x);
        }

        let heads = self.num_hidden();
        let position = self.layer(heads, &x, batch, ctx);
        let orientation = self.layer(heads + 1, &x, batch, ctx);

        Ok(PoseOutput {
            position,
            orientation,
            features,
        })
    }

    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn parameter_names(&self) -> Vec<String> {
        let heads = self.num_hidden();
        (0..self.shapes.len())
            .flat_map(|layer| {
                let prefix = match layer {
                    l if l < heads => format!("hidden.{l}"),
                    l if l == heads => "position_head".to_string(),
                    _ => "orientation_head".to_string(),
                };
                [format!("{prefix}.weight"), format!("{prefix}.bias")]
            })
            .collect()
    }

    fn freeze(&mut self) {
        for p in &mut self.params {
            *p = p.clone().with_requires_grad(false);
        }
    }
}
