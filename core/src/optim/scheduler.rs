//! Learning Rate Schedulers.

/// A trait for learning rate schedulers.
pub trait LRScheduler: Send {
    /// Calculates the learning rate for a given optimizer step (0-based).
    fn get_lr(&self, step: usize) -> f32;
}

/// Linear Warmup with Linear Decay.
///
/// Increases LR from 0 to `max_lr` over `warmup_steps`.
/// Then decays linearly to `min_lr` at `total_steps` and stays there.
#[derive(Debug, Clone, Copy)]
pub struct LinearWarmup {
    pub max_lr: f32,
    pub min_lr: f32,
    pub warmup_steps: usize,
    pub total_steps: usize,
}

impl LinearWarmup {
    pub fn new(max_lr: f32, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            max_lr,
            min_lr: 0.0,
            warmup_steps,
            total_steps,
        }
    }

    pub fn with_min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self
    }
}

impl LRScheduler for LinearWarmup {
    fn get_lr(&self, step: usize) -> f32 {
        if step < self.warmup_steps {
            self.max_lr * (step as f32 / self.warmup_steps as f32)
        } else if step < self.total_steps {
            let decay_steps = self.total_steps - self.warmup_steps;
            let current_decay_step = step - self.warmup_steps;
            let progress = current_decay_step as f32 / decay_steps as f32;
            self.max_lr - (self.max_lr - self.min_lr) * progress
        } else {
            self.min_lr
        }
    }
}
