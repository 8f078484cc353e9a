//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}

/// Rescale gradients so their global L2 norm is at most `max_norm`
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let total_norm = params
        .iter()
        .filter_map(|p| p.grad())
        .map(|g| g.iter().map(|v| v * v).sum::<f32>())
        .sum::<f32>()
        .sqrt();

    if total_norm > max_norm && total_norm > 0.0 {
        let factor = max_norm / (total_norm + 1e-6);
        for param in params.iter() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * factor);
            }
        }
    }

    total_norm
}
