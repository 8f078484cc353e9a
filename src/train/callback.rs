//! Callback system for training events
//!
//! Provides extensible hooks for training loop events:
//! - `on_train_begin` / `on_train_end`
//! - `on_epoch_begin` / `on_epoch_end`
//! - `on_step_begin` / `on_step_end`
//!
//! # Example
//!
//! ```rust
//! use posekd::train::callback::{TrainerCallback, CallbackContext, CallbackAction};
//!
//! struct StopOnDivergence;
//!
//! impl TrainerCallback for StopOnDivergence {
//!     fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
//!         if ctx.loss.is_finite() {
//!             CallbackAction::Continue
//!         } else {
//!             CallbackAction::Stop
//!         }
//!     }
//! }
//! ```

use tracing::{debug, info, warn};

/// Context passed to callbacks with current training state
#[derive(Clone, Debug)]
pub struct CallbackContext {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Total epochs planned
    pub max_epochs: usize,
    /// Current step within epoch
    pub step: usize,
    /// Total steps in epoch
    pub steps_per_epoch: usize,
    /// Global step count
    pub global_step: usize,
    /// Current total loss
    pub loss: f32,
    /// Position component of the current loss
    pub position_loss: f32,
    /// β-weighted orientation component of the current loss
    pub orientation_loss: f32,
    /// Current learning rate
    pub lr: f32,
    /// Best loss seen so far
    pub best_loss: Option<f32>,
    /// Median position error on the validation set (if available)
    pub val_loss: Option<f32>,
    /// Median orientation error in degrees on the validation set
    pub val_orientation_deg: Option<f32>,
    /// Training duration in seconds
    pub elapsed_secs: f64,
}

impl Default for CallbackContext {
    fn default() -> Self {
        Self {
            epoch: 0,
            max_epochs: 0,
            step: 0,
            steps_per_epoch: 0,
            global_step: 0,
            loss: 0.0,
            position_loss: 0.0,
            orientation_loss: 0.0,
            lr: 0.0,
            best_loss: None,
            val_loss: None,
            val_orientation_deg: None,
            elapsed_secs: 0.0,
        }
    }
}

/// Action to take after a callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// Continue training normally
    Continue,
    /// Stop training (early stopping)
    Stop,
    /// Skip rest of current epoch
    SkipEpoch,
}

/// Trait for training callbacks
///
/// Implement this trait to hook into training events. All methods have
/// default no-op implementations, so you only need to implement the
/// events you care about.
pub trait TrainerCallback: Send {
    /// Called before training starts
    fn on_train_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after training ends
    fn on_train_end(&mut self, _ctx: &CallbackContext) {}

    /// Called before each epoch
    fn on_epoch_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after each epoch
    fn on_epoch_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called before each training step
    fn on_step_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after each training step
    fn on_step_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Checkpoint labels requested since the last call
    ///
    /// The trainer owns the model, so callbacks only ask for saves.
    fn take_checkpoint_requests(&mut self) -> Vec<String> {
        Vec::new()
    }

    /// Get callback name for logging
    fn name(&self) -> &str {
        "TrainerCallback"
    }
}

// =============================================================================
// Early Stopping Callback
// =============================================================================

/// Early stopping callback to halt training when loss plateaus
///
/// Monitors a metric and stops training if no improvement is seen
/// for `patience` epochs.
///
/// # Example
///
/// ```rust
/// use posekd::train::callback::EarlyStopping;
///
/// // Stop if the validation error has not improved for 5 epochs
/// let early_stop = EarlyStopping::new(5, 0.001).monitor_validation();
/// ```
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    /// Number of epochs to wait for improvement
    patience: usize,
    /// Minimum improvement to reset patience
    min_delta: f32,
    /// Best loss seen so far
    best_loss: f32,
    /// Epochs without improvement
    epochs_without_improvement: usize,
    /// Monitor validation loss instead of training loss
    monitor_val: bool,
}

impl EarlyStopping {
    /// Create new early stopping callback
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best_loss: f32::INFINITY,
            epochs_without_improvement: 0,
            monitor_val: false,
        }
    }

    /// Monitor the validation error, falling back to the training loss for
    /// epochs without validation
    pub fn monitor_validation(mut self) -> Self {
        self.monitor_val = true;
        self
    }

    /// Reset internal state
    pub fn reset(&mut self) {
        self.best_loss = f32::INFINITY;
        self.epochs_without_improvement = 0;
    }

    fn check_improvement(&mut self, loss: f32) -> bool {
        if loss < self.best_loss - self.min_delta {
            self.best_loss = loss;
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            false
        }
    }
}

impl TrainerCallback for EarlyStopping {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let loss = if self.monitor_val {
            ctx.val_loss.unwrap_or(ctx.loss)
        } else {
            ctx.loss
        };
        self.check_improvement(loss);

        if self.epochs_without_improvement >= self.patience {
            warn!(
                patience = self.patience,
                best_loss = self.best_loss,
                "early stopping: no improvement"
            );
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }

    fn name(&self) -> &str {
        "EarlyStopping"
    }
}

// =============================================================================
// Checkpoint Callback
// =============================================================================

/// Label of the rolling checkpoint
pub const LATEST_LABEL: &str = "latest";

/// Label of the checkpoint with the lowest monitored loss
pub const BEST_LABEL: &str = "best";

/// Checkpoint callback requesting saves periodically
///
/// Every `save_every` epochs it asks for a `latest` checkpoint plus one
/// labeled with the epoch number; with `save_best` it also asks for `best`
/// whenever the monitored loss improves. `latest` is always saved when
/// training ends.
#[derive(Clone, Debug)]
pub struct CheckpointCallback {
    /// Save every N epochs (None = only best and final)
    save_every: Option<usize>,
    /// Save on best loss
    save_best: bool,
    /// Best loss seen
    best_loss: f32,
    /// Labels not yet handed to the trainer
    pending: Vec<String>,
}

impl CheckpointCallback {
    pub fn new() -> Self {
        Self {
            save_every: None,
            save_best: false,
            best_loss: f32::INFINITY,
            pending: Vec::new(),
        }
    }

    /// Configure to save every N epochs
    pub fn save_every(mut self, epochs: usize) -> Self {
        self.save_every = (epochs > 0).then_some(epochs);
        self
    }

    /// Configure to save on best loss
    pub fn save_best(mut self, save: bool) -> Self {
        self.save_best = save;
        self
    }

    fn request(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.pending.contains(&label) {
            self.pending.push(label);
        }
    }
}

impl Default for CheckpointCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainerCallback for CheckpointCallback {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let epoch = ctx.epoch + 1;
        if let Some(interval) = self.save_every {
            if epoch % interval == 0 {
                debug!(epoch, "periodic checkpoint");
                self.request(LATEST_LABEL);
                self.request(epoch.to_string());
            }
        }

        let loss = ctx.val_loss.unwrap_or(ctx.loss);
        if self.save_best && loss < self.best_loss {
            self.best_loss = loss;
            self.request(BEST_LABEL);
        }

        CallbackAction::Continue
    }

    fn on_train_end(&mut self, _ctx: &CallbackContext) {
        self.request(LATEST_LABEL);
    }

    fn take_checkpoint_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    fn name(&self) -> &str {
        "CheckpointCallback"
    }
}

// =============================================================================
// Progress Callback
// =============================================================================

/// Progress callback for logging training progress
#[derive(Clone, Debug)]
pub struct ProgressCallback {
    /// Log every N steps
    log_interval: usize,
}

impl ProgressCallback {
    /// Create progress callback
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl Default for ProgressCallback {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl TrainerCallback for ProgressCallback {
    fn on_epoch_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        info!(
            epoch = ctx.epoch + 1,
            max_epochs = ctx.max_epochs,
            lr = ctx.lr,
            "epoch starting"
        );
        CallbackAction::Continue
    }

    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        match (ctx.val_loss, ctx.val_orientation_deg) {
            (Some(position), Some(orientation)) => info!(
                epoch = ctx.epoch + 1,
                loss = ctx.loss,
                val_position = position,
                val_orientation_deg = orientation,
                elapsed_secs = ctx.elapsed_secs,
                "epoch finished"
            ),
            _ => info!(
                epoch = ctx.epoch + 1,
                loss = ctx.loss,
                elapsed_secs = ctx.elapsed_secs,
                "epoch finished"
            ),
        }
        CallbackAction::Continue
    }

    fn on_step_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        if ctx.step > 0 && ctx.step % self.log_interval == 0 {
            info!(
                epoch = ctx.epoch + 1,
                step = ctx.step,
                steps = ctx.steps_per_epoch,
                loss = ctx.loss,
                position = ctx.position_loss,
                orientation = ctx.orientation_loss,
                "training step"
            );
        }
        CallbackAction::Continue
    }

    fn name(&self) -> &str {
        "ProgressCallback"
    }
}

// =============================================================================
// Callback Manager
// =============================================================================

/// Manages multiple callbacks and dispatches events
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainerCallback>>,
}

impl CallbackManager {
    /// Create new callback manager
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a callback
    pub fn add<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Check if no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Get number of callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Names of the registered callbacks
    pub fn names(&self) -> Vec<&str> {
        self.callbacks.iter().map(|cb| cb.name()).collect()
    }

    /// Fire train begin event
    pub fn on_train_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        for cb in &mut self.callbacks {
            if cb.on_train_begin(ctx) == CallbackAction::Stop {
                return CallbackAction::Stop;
            }
        }
        CallbackAction::Continue
    }

    /// Fire train end event
    pub fn on_train_end(&mut self, ctx: &CallbackContext) {
        for cb in &mut self.callbacks {
            cb.on_train_end(ctx);
        }
    }

    /// Fire epoch begin event
    pub fn on_epoch_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        for cb in &mut self.callbacks {
            match cb.on_epoch_begin(ctx) {
                CallbackAction::Stop => return CallbackAction::Stop,
                CallbackAction::SkipEpoch => return CallbackAction::SkipEpoch,
                _ => {}
            }
        }
        CallbackAction::Continue
    }

    /// Fire epoch end event
    ///
    /// Every callback sees the event, even after one asks to stop.
    pub fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let mut action = CallbackAction::Continue;
        for cb in &mut self.callbacks {
            if cb.on_epoch_end(ctx) == CallbackAction::Stop {
                action = CallbackAction::Stop;
            }
        }
        action
    }

    /// Fire step begin event
    pub fn on_step_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        for cb in &mut self.callbacks {
            if cb.on_step_begin(ctx) == CallbackAction::Stop {
                return CallbackAction::Stop;
            }
        }
        CallbackAction::Continue
    }

    /// Fire step end event
    pub fn on_step_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        for cb in &mut self.callbacks {
            if cb.on_step_end(ctx) == CallbackAction::Stop {
                return CallbackAction::Stop;
            }
        }
        CallbackAction::Continue
    }

    /// Drain checkpoint requests from every callback, without duplicates
    pub fn take_checkpoint_requests(&mut self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for cb in &mut self.callbacks {
            for label in cb.take_checkpoint_requests() {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        labels
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================


// =============================================================================
// Property Tests
// =============================================================================
