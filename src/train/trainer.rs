//! Epoch loop driving a [`PoseModel`]

use super::callback::{
    CallbackAction, CallbackContext, CallbackManager, CheckpointCallback, TrainerCallback,
};
use super::eval::{evaluate, EvalSummary};
use super::{Batch, EpochLosses, MetricsTracker, PoseModel, TrainConfig};
use crate::distill::LossBreakdown;
use crate::optim::LRScheduler;
use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Number of completed epochs
    pub final_epoch: usize,
    /// Mean total loss of the last completed epoch
    pub final_loss: f32,
    /// Lowest epoch loss achieved
    pub best_loss: f32,
    /// Whether a callback stopped training early
    pub stopped_early: bool,
    /// Total training time in seconds
    pub elapsed_secs: f64,
    /// Evaluation of the last validated epoch
    pub validation: Option<EvalSummary>,
    /// Checkpoints written during the run
    pub checkpoints: Vec<PathBuf>,
}

/// Trainer that runs epochs over a [`PoseModel`]
///
/// After every epoch the optional learning-rate scheduler advances, the
/// validation set (if any) is evaluated, callbacks run and requested
/// checkpoints are written.
///
/// # Example
///
/// ```no_run
/// use posekd::train::{EarlyStopping, ModelOptions, PoseModel, PoseTrainer, TrainConfig};
/// use posekd::network::MlpPoseNet;
/// use posekd::optim::LinearDecayLR;
///
/// let student = Box::new(MlpPoseNet::new(64, &[32, 16], 0.0, 0).unwrap());
/// let model = PoseModel::new(student, None, ModelOptions::default()).unwrap();
///
/// let mut trainer = PoseTrainer::new(model, TrainConfig::default())
///     .with_scheduler(Box::new(LinearDecayLR::new(1e-3, 5, 5)));
/// trainer.add_callback(EarlyStopping::new(3, 0.001));
///
/// // let result = trainer.train(10, |epoch| loader_for(epoch), Some(&val_batches))?;
/// ```
pub struct PoseTrainer {
    model: PoseModel,

    config: TrainConfig,

    scheduler: Option<Box<dyn LRScheduler>>,

    /// Metrics tracker
    pub metrics: MetricsTracker,

    callbacks: CallbackManager,

    best_loss: Option<f32>,

    start_time: Option<Instant>,
}

impl PoseTrainer {
    /// Create a trainer; checkpoint and progress callbacks come from `config`
    pub fn new(model: PoseModel, config: TrainConfig) -> Self {
        let mut callbacks = CallbackManager::new();
        callbacks.add(super::ProgressCallback::new(config.log_interval));
        let mut checkpoints = CheckpointCallback::new().save_best(config.save_best);
        if let Some(every) = config.save_every {
            checkpoints = checkpoints.save_every(every);
        }
        callbacks.add(checkpoints);

        Self {
            model,
            config,
            scheduler: None,
            metrics: MetricsTracker::new(),
            callbacks,
            best_loss: None,
            start_time: None,
        }
    }

    /// Drive the learning rate with `scheduler`, applied once per epoch
    pub fn with_scheduler(mut self, scheduler: Box<dyn LRScheduler>) -> Self {
        self.model.set_lr(scheduler.get_lr());
        self.scheduler = Some(scheduler);
        self
    }

    /// Add a callback to the trainer
    pub fn add_callback<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.add(callback);
    }

    pub fn callbacks(&self) -> &CallbackManager {
        &self.callbacks
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn model(&self) -> &PoseModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut PoseModel {
        &mut self.model
    }

    pub fn into_model(self) -> PoseModel {
        self.model
    }

    /// Get current learning rate
    pub fn lr(&self) -> f32 {
        self.model.lr()
    }

    fn build_context(
        &self,
        epoch: usize,
        max_epochs: usize,
        step: usize,
        steps_per_epoch: usize,
        losses: EpochLosses,
    ) -> CallbackContext {
        CallbackContext {
            epoch,
            max_epochs,
            step,
            steps_per_epoch,
            global_step: self.metrics.steps,
            loss: losses.total,
            position_loss: losses.position,
            orientation_loss: losses.orientation,
            lr: self.lr(),
            best_loss: self.best_loss,
            val_loss: None,
            val_orientation_deg: None,
            elapsed_secs: self
                .start_time
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    /// One optimization step on `batch`
    pub fn train_step(&mut self, batch: &Batch) -> Result<LossBreakdown> {
        let loss = self.model.optimize_parameters(batch)?;
        self.metrics.increment_step();
        Ok(loss)
    }

    /// Train for one epoch and return the mean loss components
    ///
    /// Returns `None` when a step callback asked to stop.
    fn run_epoch(
        &mut self,
        epoch: usize,
        max_epochs: usize,
        batches: &[Batch],
    ) -> Result<Option<EpochLosses>> {
        let steps_per_epoch = batches.len();
        let mut sum = EpochLosses::default();
        // Losses of the previous step; zero before the first one
        let mut previous = EpochLosses::default();

        for (step, batch) in batches.iter().enumerate() {
            let ctx = self.build_context(epoch, max_epochs, step, steps_per_epoch, previous);
            if self.callbacks.on_step_begin(&ctx) == CallbackAction::Stop {
                return Ok(None);
            }

            let current = EpochLosses::from_breakdown(&self.train_step(batch)?);
            sum.accumulate(&current);
            previous = current;

            let ctx = self.build_context(epoch, max_epochs, step + 1, steps_per_epoch, current);
            if self.callbacks.on_step_end(&ctx) == CallbackAction::Stop {
                return Ok(None);
            }
        }

        Ok(Some(sum.mean(steps_per_epoch)))
    }

    /// Train one epoch over `batches`, without callbacks or scheduling
    pub fn train_epoch(&mut self, batches: &[Batch]) -> Result<EpochLosses> {
        let mut sum = EpochLosses::default();
        for batch in batches {
            sum.accumulate(&EpochLosses::from_breakdown(&self.train_step(batch)?));
        }
        let losses = sum.mean(batches.len());
        self.metrics.record_epoch(losses, self.lr());
        Ok(losses)
    }

    /// Evaluate the student on `batches`
    pub fn validate(&mut self, batches: &[Batch]) -> Result<EvalSummary> {
        let summary = evaluate(&mut self.model, batches)?;
        self.metrics.record_val_loss(summary.median_position);
        Ok(summary)
    }

    fn save_requested(&mut self, saved: &mut Vec<PathBuf>) -> Result<()> {
        for label in self.callbacks.take_checkpoint_requests() {
            saved.push(self.model.save(&label)?);
        }
        Ok(())
    }

    /// Train for up to `max_epochs` epochs
    ///
    /// `batch_fn` produces the training batches for an epoch index, so
    /// shuffling can be reseeded per epoch. When `val` is given it is
    /// evaluated after every epoch and its median position error drives
    /// early stopping and `best` checkpoints.
    pub fn train<B>(
        &mut self,
        max_epochs: usize,
        mut batch_fn: B,
        val: Option<&[Batch]>,
    ) -> Result<TrainResult>
    where
        B: FnMut(usize) -> Result<Vec<Batch>>,
    {
        let start = Instant::now();
        self.start_time = Some(start);
        self.best_loss = None;
        let mut stopped_early = false;
        let mut final_loss = 0.0;
        let mut validation = None;
        let mut saved = Vec::new();

        info!(
            max_epochs,
            distilling = self.model.is_distilling(),
            lr = self.lr(),
            "training started"
        );

        let ctx = self.build_context(0, max_epochs, 0, 0, EpochLosses::default());
        if self.callbacks.on_train_begin(&ctx) == CallbackAction::Stop {
            stopped_early = true;
        }

        let mut epoch = 0;
        while !stopped_early && epoch < max_epochs {
            let ctx = self.build_context(epoch, max_epochs, 0, 0, EpochLosses::default());
            match self.callbacks.on_epoch_begin(&ctx) {
                CallbackAction::Stop => {
                    stopped_early = true;
                    break;
                }
                CallbackAction::SkipEpoch => {
                    epoch += 1;
                    continue;
                }
                CallbackAction::Continue => {}
            }

            let batches = batch_fn(epoch)?;
            if batches.is_empty() {
                return Err(Error::InvalidParameter(format!(
                    "no training batches for epoch {epoch}"
                )));
            }

            let Some(losses) = self.run_epoch(epoch, max_epochs, &batches)? else {
                stopped_early = true;
                break;
            };
            final_loss = losses.total;
            if self.best_loss.map_or(true, |best| losses.total < best) {
                self.best_loss = Some(losses.total);
            }
            self.metrics.record_epoch(losses, self.lr());

            let mut ctx = self.build_context(
                epoch,
                max_epochs,
                batches.len(),
                batches.len(),
                losses,
            );
            if let Some(val) = val.filter(|v| !v.is_empty()) {
                let summary = self.validate(val)?;
                ctx.val_loss = Some(summary.median_position);
                ctx.val_orientation_deg = Some(summary.median_orientation_deg);
                validation = Some(summary);
            }

            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.step();
                let lr = scheduler.get_lr();
                self.model.set_lr(lr);
                info!(lr, "learning rate updated");
            }

            if self.callbacks.on_epoch_end(&ctx) == CallbackAction::Stop {
                stopped_early = true;
            }
            self.save_requested(&mut saved)?;
            epoch += 1;
        }

        let ctx = self.build_context(
            self.metrics.epoch(),
            max_epochs,
            0,
            0,
            EpochLosses {
                total: final_loss,
                ..EpochLosses::default()
            },
        );
        self.callbacks.on_train_end(&ctx);
        self.save_requested(&mut saved)?;

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            epochs = self.metrics.epoch(),
            final_loss, stopped_early, elapsed_secs, "training finished"
        );

        Ok(TrainResult {
            final_epoch: self.metrics.epoch(),
            final_loss,
            best_loss: self.best_loss.unwrap_or(final_loss),
            stopped_early,
            elapsed_secs,
            validation,
            checkpoints: saved,
        })
    }
}
