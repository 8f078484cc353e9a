//! Learning rate schedulers

use super::Optimizer;
use std::f32::consts::PI;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler (called after each epoch)
    fn step(&mut self);

    /// Apply the current learning rate to an optimizer
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }
}

/// Constant learning rate followed by a linear decay to zero
///
/// `get_lr` returns `lr` while the epoch index is at most `niter`, so the
/// first `niter + 1` epochs run at the full rate. Every later epoch drops the
/// rate by `lr / niter_decay`. Over `niter + niter_decay` epochs the last
/// epoch therefore runs at `lr / niter_decay`; zero is only reached one epoch
/// past that.
pub struct LinearDecayLR {
    lr: f32,
    niter: usize,
    niter_decay: usize,
    current_epoch: usize,
}

impl LinearDecayLR {
    /// Create a new linear decay scheduler
    pub fn new(lr: f32, niter: usize, niter_decay: usize) -> Self {
        Self {
            lr,
            niter,
            niter_decay,
            current_epoch: 0,
        }
    }
}

impl LRScheduler for LinearDecayLR {
    fn get_lr(&self) -> f32 {
        if self.current_epoch <= self.niter {
            return self.lr;
        }
        if self.niter_decay == 0 {
            return 0.0;
        }
        let decayed = self.current_epoch - self.niter;
        (self.lr - self.lr * decayed as f32 / self.niter_decay as f32).max(0.0)
    }

    fn step(&mut self) {
        self.current_epoch += 1;
    }
}

/// Cosine Annealing Learning Rate Scheduler
///
/// Formula: lr_t = lr_min + 0.5 * (lr_max - lr_min) * (1 + cos(π * t / T))
pub struct CosineAnnealingLR {
    lr_max: f32,
    lr_min: f32,
    t_max: usize,
    current_step: usize,
}

impl CosineAnnealingLR {
    /// Create a new cosine annealing scheduler
    pub fn new(lr_max: f32, t_max: usize, lr_min: f32) -> Self {
        Self {
            lr_max,
            lr_min,
            t_max,
            current_step: 0,
        }
    }
}

impl LRScheduler for CosineAnnealingLR {
    fn get_lr(&self) -> f32 {
        if self.current_step >= self.t_max {
            return self.lr_min;
        }

        let progress = self.current_step as f32 / self.t_max as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.lr_min + (self.lr_max - self.lr_min) * cosine_decay
    }

    fn step(&mut self) {
        self.current_step += 1;
    }
}
