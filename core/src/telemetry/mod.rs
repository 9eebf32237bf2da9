//! Training telemetry: per-step loss records, phase timing, and reading the
//! loss logs back as curves.

pub mod curves;
pub mod recorder;
pub mod timer;

pub use curves::{DEFAULT_ZOOM_SKIP, LossCurve, avg_loss_range, discover_loss_logs};
pub use recorder::{StepTelemetryRecorder, TrainingStepRecord};
pub use timer::{DurationAccumulator, PhaseTimer, TimingReport};
