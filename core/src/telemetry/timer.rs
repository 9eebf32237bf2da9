use crate::error::{DdpError, Result};
use std::time::{Duration, Instant};
use tracing::info;

/// Count and running sum of durations, optionally setting the first sample
/// aside.
#[derive(Debug, Clone, Default)]
pub struct DurationAccumulator {
    exclude_first: bool,
    first: Option<Duration>,
    samples: Vec<Duration>,
    sum: Duration,
}

impl DurationAccumulator {
    pub fn new(exclude_first: bool) -> Self {
        Self {
            exclude_first,
            ..Default::default()
        }
    }

    pub fn push(&mut self, d: Duration) {
        if self.exclude_first && self.first.is_none() {
            self.first = Some(d);
            return;
        }
        self.sum += d;
        self.samples.push(d);
    }

    /// The sample set aside, if any.
    pub fn first(&self) -> Option<Duration> {
        self.first
    }

    /// Samples that count towards the mean.
    pub fn samples(&self) -> &[Duration] {
        &self.samples
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn mean(&self) -> Option<Duration> {
        let n = u32::try_from(self.samples.len()).ok().filter(|&n| n > 0)?;
        Some(self.sum / n)
    }
}

/// Summary handed out at the end of training.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingReport {
    /// The very first iteration, excluded from `iteration_mean`.
    pub first_iteration: Option<Duration>,
    pub iteration_mean: Option<Duration>,
    /// Iterations 2..N.
    pub iterations: Vec<Duration>,
    pub epoch_mean: Option<Duration>,
    pub epochs: Vec<Duration>,
}

impl TimingReport {
    pub fn log(&self) {
        if let Some(first) = self.first_iteration {
            info!("First iteration time (excluded from average): {:.4} seconds", first.as_secs_f64());
        }
        if let Some(mean) = self.iteration_mean {
            info!("Average iteration time (excluding first iteration): {:.4} seconds", mean.as_secs_f64());
        }
        for (i, d) in self.iterations.iter().enumerate() {
            info!("Iteration {} time: {:.4} seconds", i + 1, d.as_secs_f64());
        }
        if let Some(mean) = self.epoch_mean {
            info!("Average epoch time: {:.4} seconds", mean.as_secs_f64());
        }
    }
}

/// Wall-clock timing of optimizer iterations and epochs.
///
/// The first iteration of the run usually pays one-time warm-up costs, so it
/// is reported on its own and left out of the iteration mean. Epochs are all
/// averaged.
#[derive(Debug)]
pub struct PhaseTimer {
    iterations: DurationAccumulator,
    epochs: DurationAccumulator,
    iteration_start: Option<Instant>,
    epoch_start: Option<Instant>,
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self {
            iterations: DurationAccumulator::new(true),
            epochs: DurationAccumulator::new(false),
            iteration_start: None,
            epoch_start: None,
        }
    }

    pub fn start_iteration(&mut self) {
        self.iteration_start = Some(Instant::now());
    }

    pub fn stop_iteration(&mut self) -> Result<Duration> {
        let start = self
            .iteration_start
            .take()
            .ok_or_else(|| DdpError::InvalidState("stop_iteration without start_iteration".into()))?;
        let d = start.elapsed();
        self.record_iteration(d);
        Ok(d)
    }

    pub fn start_epoch(&mut self) {
        self.epoch_start = Some(Instant::now());
    }

    pub fn stop_epoch(&mut self) -> Result<Duration> {
        let start = self
            .epoch_start
            .take()
            .ok_or_else(|| DdpError::InvalidState("stop_epoch without start_epoch".into()))?;
        let d = start.elapsed();
        self.record_epoch(d);
        Ok(d)
    }

    pub fn record_iteration(&mut self, d: Duration) {
        self.iterations.push(d);
    }

    pub fn record_epoch(&mut self, d: Duration) {
        self.epochs.push(d);
    }

    pub fn report(&self) -> TimingReport {
        TimingReport {
            first_iteration: self.iterations.first(),
            iteration_mean: self.iterations.mean(),
            iterations: self.iterations.samples().to_vec(),
            epoch_mean: self.epochs.mean(),
            epochs: self.epochs.samples().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_iteration_excluded() {
        let mut timer = PhaseTimer::new();
        timer.record_iteration(ms(900));
        timer.record_iteration(ms(10));
        timer.record_iteration(ms(20));
        timer.record_epoch(ms(1000));
        timer.record_epoch(ms(2000));

        let report = timer.report();
        assert_eq!(report.first_iteration, Some(ms(900)));
        assert_eq!(report.iterations, vec![ms(10), ms(20)]);
        assert_eq!(report.iteration_mean, Some(ms(15)));
        assert_eq!(report.epoch_mean, Some(ms(1500)));
    }

    #[test]
    fn test_single_iteration_has_no_mean() {
        let mut timer = PhaseTimer::new();
        timer.record_iteration(ms(5));
        let report = timer.report();
        assert_eq!(report.first_iteration, Some(ms(5)));
        assert_eq!(report.iteration_mean, None);
        assert_eq!(report.epoch_mean, None);
    }

    #[test]
    fn test_start_stop() {
        let mut timer = PhaseTimer::new();
        assert!(timer.stop_iteration().is_err());
        timer.start_epoch();
        timer.start_iteration();
        timer.stop_iteration().unwrap();
        timer.stop_epoch().unwrap();
        assert!(timer.stop_epoch().is_err());
        assert_eq!(timer.report().epochs.len(), 1);
    }
}
