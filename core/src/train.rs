//! The data-parallel training loop.

use crate::config::RunConfig;
use crate::data::{DataLoader, DistributedSampler, FeatureSet};
use crate::distributed::{GradientSynchronizer, ProcessGroup};
use crate::error::Result;
use crate::eval::{EvaluationEmitter, MetricMap, SubTask};
use crate::models::{FineTuneModel, clip_grad_norm};
use crate::optim::{LRScheduler, LinearWarmup, Optimizer};
use crate::telemetry::{PhaseTimer, StepTelemetryRecorder, TimingReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// What a finished training run reports back.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub global_step: usize,
    /// Mean scaled step loss per optimizer step.
    pub average_loss: f64,
    pub timing: TimingReport,
    pub loss_log: PathBuf,
}

/// Optimizer steps and epochs implied by the config for a loader of
/// `batches_per_epoch` batches: `(t_total, epochs)`.
pub fn schedule_length(config: &RunConfig, batches_per_epoch: usize) -> (usize, usize) {
    let updates_per_epoch = batches_per_epoch / config.gradient_accumulation_steps;
    match config.max_steps.filter(|&m| m > 0) {
        Some(max_steps) => (max_steps, max_steps / updates_per_epoch.max(1) + 1),
        None => (
            updates_per_epoch * config.num_train_epochs,
            config.num_train_epochs,
        ),
    }
}

/// Drives one rank through training: forward/backward per micro-step,
/// gradient averaging and an optimizer step per accumulation window, loss
/// telemetry, timing, and an evaluation pass after every epoch.
pub struct Trainer<'a> {
    config: &'a RunConfig,
    group: &'a ProcessGroup,
    emitter: EvaluationEmitter,
    recorder: StepTelemetryRecorder,
    timer: PhaseTimer,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a RunConfig, group: &'a ProcessGroup) -> Result<Self> {
        Ok(Self {
            config,
            group,
            emitter: EvaluationEmitter::for_rank(
                group.rank_info(),
                &config.task_name.to_lowercase(),
                &config.output_dir,
            ),
            recorder: StepTelemetryRecorder::new(group.rank_info()),
            timer: PhaseTimer::new(),
        })
    }

    pub fn recorder(&self) -> &StepTelemetryRecorder {
        &self.recorder
    }

    pub fn emitter(&self) -> &EvaluationEmitter {
        &self.emitter
    }

    /// Trains `model` on this rank's shard of `train_set`.
    ///
    /// `evaluate` scores the model on one evaluation sub-task; it is called
    /// after every completed epoch when `do_eval` is set.
    pub fn train<E>(
        &mut self,
        model: &mut dyn FineTuneModel,
        optimizer: &mut dyn Optimizer,
        train_set: Arc<FeatureSet>,
        mut evaluate: E,
    ) -> Result<TrainOutcome>
    where
        E: FnMut(&dyn FineTuneModel, &SubTask) -> Result<MetricMap>,
    {
        let config = self.config;
        let rank = self.group.rank_info();
        let accum = config.gradient_accumulation_steps;
        let max_steps = config.max_steps.filter(|&m| m > 0);

        let mut loader: DataLoader<FeatureSet> =
            DataLoader::from_shared(train_set, config.train_batch_size).with_sampler(
                DistributedSampler::new(rank.id(), rank.world_size(), config.seed),
            );
        let (t_total, epochs) = schedule_length(config, loader.len());
        let scheduler = LinearWarmup::new(config.learning_rate, config.warmup_steps, t_total);
        let sync = GradientSynchronizer::new(self.group);

        info!(rank = rank.id(), "***** Running training *****");
        info!("  Num examples = {}", loader.num_samples());
        info!("  Num Epochs = {epochs}");
        info!("  Batch size per rank = {}", config.train_batch_size);
        info!(
            "  Total train batch size (w. parallel, distributed & accumulation) = {}",
            config.effective_batch_size()
        );
        info!("  Gradient Accumulation steps = {accum}");
        info!("  Total optimization steps = {t_total}");

        let mut global_step = 0usize;
        let mut tr_loss = 0.0f64;
        model.zero_grad();

        for epoch in 1..=epochs {
            loader.set_epoch(epoch as u64);
            self.timer.start_epoch();
            let mut stop = false;

            for (step, batch) in loader.iter().enumerate() {
                let batch = batch?;
                if step % accum == 0 {
                    self.timer.start_iteration();
                }

                let out = model.forward(&batch)?;
                let loss = out.loss / accum as f32;
                model.backward(&batch, 1.0 / accum as f32)?;

                tr_loss += f64::from(loss);
                self.recorder.record(epoch, step, global_step, f64::from(loss));

                if (step + 1) % accum == 0 {
                    sync.synchronize(model.parameters_mut())?;
                    clip_grad_norm(model.parameters_mut(), config.max_grad_norm);
                    optimizer.step(model.parameters_mut(), scheduler.get_lr(global_step))?;
                    optimizer.zero_grad(model.parameters_mut());
                    global_step += 1;
                    self.timer.stop_iteration()?;
                }

                if max_steps.is_some_and(|m| global_step > m) {
                    stop = true;
                    break;
                }
            }

            let elapsed = self.timer.stop_epoch()?;
            info!(
                rank = rank.id(),
                "Epoch {epoch} completed in {:.4} seconds",
                elapsed.as_secs_f64()
            );
            if stop {
                break;
            }

            if config.do_eval {
                let model_ref: &dyn FineTuneModel = &*model;
                self.emitter
                    .evaluate(&epoch.to_string(), |sub| evaluate(model_ref, sub))?;
            }
        }

        let timing = self.timer.report();
        timing.log();
        self.recorder.log_totals();
        let loss_log = self.recorder.flush_to_dir(&config.output_dir)?;

        let average_loss = if global_step > 0 {
            tr_loss / global_step as f64
        } else {
            0.0
        };
        info!(rank = rank.id(), global_step, average_loss, "training finished");

        Ok(TrainOutcome {
            global_step,
            average_loss,
            timing,
            loss_log,
        })
    }
}
