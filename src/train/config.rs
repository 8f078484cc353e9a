//! Trainer configuration and metrics

use crate::distill::LossBreakdown;
use serde::{Deserialize, Serialize};

/// Trainer configuration
#[derive(Clone, Debug)]
pub struct TrainConfig {
    /// Log training progress every N steps
    pub log_interval: usize,

    /// Save `latest` and an epoch-labeled checkpoint every N epochs
    pub save_every: Option<usize>,

    /// Save a `best` checkpoint whenever the monitored loss improves
    pub save_best: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            log_interval: 10,
            save_every: None,
            save_best: false,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set logging interval
    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval.max(1);
        self
    }

    /// Set periodic checkpointing (0 disables)
    pub fn with_save_every(mut self, epochs: usize) -> Self {
        self.save_every = (epochs > 0).then_some(epochs);
        self
    }

    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

/// Mean loss components over one epoch
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochLosses {
    pub total: f32,
    pub position: f32,
    pub orientation: f32,
    pub feature: f32,
    pub cross_similarity: f32,
}

impl EpochLosses {
    /// Scalar components of one step
    pub fn from_breakdown(loss: &LossBreakdown) -> Self {
        Self {
            total: loss.total_value(),
            position: loss.position,
            orientation: loss.orientation,
            feature: loss.feature,
            cross_similarity: loss.cross_similarity,
        }
    }

    /// Add another set of components
    pub fn accumulate(&mut self, other: &Self) {
        self.total += other.total;
        self.position += other.position;
        self.orientation += other.orientation;
        self.feature += other.feature;
        self.cross_similarity += other.cross_similarity;
    }

    /// Divide every component by `n` (no-op for `n == 0`)
    pub fn mean(self, n: usize) -> Self {
        if n == 0 {
            return self;
        }
        let n = n as f32;
        Self {
            total: self.total / n,
            position: self.position / n,
            orientation: self.orientation / n,
            feature: self.feature / n,
            cross_similarity: self.cross_similarity / n,
        }
    }
}

/// Tracks training metrics across epochs
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsTracker {
    /// Mean loss components, one entry per epoch
    pub epochs: Vec<EpochLosses>,

    /// Validation error history (median position error, per validated epoch)
    pub val_losses: Vec<f32>,

    /// Learning rates (one per epoch)
    pub learning_rates: Vec<f32>,

    /// Training step count
    pub steps: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an epoch's training metrics
    pub fn record_epoch(&mut self, losses: EpochLosses, lr: f32) {
        self.epochs.push(losses);
        self.learning_rates.push(lr);
    }

    /// Record validation error for the current epoch
    pub fn record_val_loss(&mut self, val_loss: f32) {
        self.val_losses.push(val_loss);
    }

    pub fn increment_step(&mut self) {
        self.steps += 1;
    }

    /// Number of completed epochs
    pub fn epoch(&self) -> usize {
        self.epochs.len()
    }

    /// Total loss per epoch
    pub fn losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.total).collect()
    }

    /// Average total loss over the last `n` epochs
    pub fn avg_loss(&self, n: usize) -> f32 {
        if self.epochs.is_empty() || n == 0 {
            return 0.0;
        }
        let recent = &self.epochs[self.epochs.len().saturating_sub(n)..];
        recent.iter().map(|e| e.total).sum::<f32>() / recent.len() as f32
    }

    /// Best (minimum) total training loss
    pub fn best_loss(&self) -> Option<f32> {
        self.epochs.iter().map(|e| e.total).min_by(f32::total_cmp)
    }

    /// Best (minimum) validation error
    pub fn best_val_loss(&self) -> Option<f32> {
        self.val_losses.iter().copied().min_by(f32::total_cmp)
    }

    /// Whether the best loss of the last `patience` epochs beats everything before
    pub fn is_improving(&self, patience: usize) -> bool {
        let losses = self.losses();
        if losses.len() <= patience || patience == 0 {
            return true;
        }
        let split = losses.len() - patience;
        let before = losses[..split].iter().copied().fold(f32::INFINITY, f32::min);
        let recent = losses[split..].iter().copied().fold(f32::INFINITY, f32::min);
        recent < before
    }
}
