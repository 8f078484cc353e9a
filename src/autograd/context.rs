//! Execution context for forward passes

/// Context for a forward pass
///
/// Carries the training flag (dropout on/off) and whether the pass records
/// history. A frozen teacher runs under [`Context::inference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    training: bool,
    grad_enabled: bool,
}

impl Context {
    /// Create a new context in training mode with gradients enabled
    pub fn new() -> Self {
        Self {
            training: true,
            grad_enabled: true,
        }
    }

    /// Evaluation mode without gradient recording
    pub fn inference() -> Self {
        Self {
            training: false,
            grad_enabled: false,
        }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Check if in training mode
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Check if forward passes should record gradient history
    pub fn grad_enabled(&self) -> bool {
        self.grad_enabled
    }

    /// Run `f` with gradient recording disabled
    pub fn no_grad<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        let ctx = Self {
            training: self.training,
            grad_enabled: false,
        };
        f(&ctx)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
