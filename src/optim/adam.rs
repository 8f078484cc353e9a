//! Adam optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// Adam optimizer (Adaptive Moment Estimation) with L2 weight decay
///
/// Weight decay is added to the gradient before the moment updates, and the
/// bias-corrected second moment is offset by `epsilon` after the square root.
/// Pose regression runs with an unusually large `epsilon = 1.0`, which damps
/// the adaptive scaling for parameters with small gradients.
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    m: Vec<Option<Array1<f32>>>, // First moment
    v: Vec<Option<Array1<f32>>>, // Second moment
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            weight_decay: 0.0,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Create Adam with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Set L2 weight decay
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Number of steps taken
    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Initialize moments if needed
    fn ensure_moments(&mut self, params: &[Tensor]) {
        if self.m.len() < params.len() {
            self.m.resize(params.len(), None);
            self.v.resize(params.len(), None);
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction factors
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);
        let step_size = self.lr / bias_correction1;
        let bc2_sqrt = bias_correction2.sqrt();

        for (i, param) in params.iter_mut().enumerate() {
            let Some(mut grad) = param.grad() else {
                continue;
            };

            if self.weight_decay != 0.0 {
                grad = grad + param.data() * self.weight_decay;
            }

            // m_t = β1 * m_{t-1} + (1 - β1) * g
            let m_t = match &self.m[i] {
                Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
                None => &grad * (1.0 - self.beta1),
            };

            // v_t = β2 * v_{t-1} + (1 - β2) * g²
            let grad_sq = &grad * &grad;
            let v_t = match &self.v[i] {
                Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
                None => &grad_sq * (1.0 - self.beta2),
            };

            // θ_t = θ_{t-1} - lr / bc1 * m_t / (√v_t / √bc2 + ε)
            let denom = v_t.mapv(|v| v.sqrt() / bc2_sqrt + self.epsilon);
            let update = &m_t / &denom * step_size;
            *param.data_mut() -= &update;

            self.m[i] = Some(m_t);
            self.v[i] = Some(v_t);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_adam_quadratic_convergence() {
        // Test convergence on f(x) = x²
        let mut params = vec![Tensor::from_vec(vec![5.0, -3.0, 2.0], true)];
        let mut optimizer = Adam::default_params(0.1);

        for _ in 0..100 {
            // Compute gradient: ∇(x²) = 2x
            let grad = params[0].data().mapv(|x| 2.0 * x);
            params[0].set_grad(grad);

            optimizer.step(&mut params);
        }

        for &val in params[0].data().iter() {
            assert!(val.abs() < 0.5, "Value {} did not converge", val);
        }
    }

    #[test]
    fn test_adam_first_step_matches_reference() {
        // With one step, m̂ = g and √v̂ = |g|: update = lr * g / (|g| + ε)
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        params[0].set_grad(ndarray::arr1(&[2.0]));

        let mut optimizer = Adam::new(0.1, 0.9, 0.999, 1.0);
        optimizer.step(&mut params);

        assert_relative_eq!(params[0].data()[0], 1.0 - 0.1 * 2.0 / 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_adam_weight_decay_shrinks_without_gradient_signal() {
        let mut params = vec![Tensor::from_vec(vec![4.0], true)];
        let mut optimizer = Adam::new(0.05, 0.9, 0.999, 1.0).with_weight_decay(0.0625);

        for _ in 0..20 {
            params[0].set_grad(ndarray::arr1(&[0.0]));
            optimizer.step(&mut params);
        }

        assert!(params[0].data()[0] < 4.0);
        assert_eq!(optimizer.steps(), 20);
    }

    #[test]
    fn test_adam_skips_params_without_grad() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        let mut optimizer = Adam::default_params(0.1);
        optimizer.step(&mut params);
        assert_eq!(params[0].data()[0], 1.0);
    }
}
