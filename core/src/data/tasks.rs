//! Registry of the supported sentence(-pair) tasks.

use crate::error::{DdpError, Result};
use crate::eval::{MetricSet, OutputMode};

/// Static description of one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskSpec {
    pub name: &'static str,
    /// Label vocabulary in class-index order; empty for regression tasks.
    pub labels: &'static [&'static str],
    pub output_mode: OutputMode,
    pub metrics: MetricSet,
}

const BINARY: &[&str] = &["0", "1"];
const ENTAILMENT: &[&str] = &["entailment", "not_entailment"];
const NLI: &[&str] = &["contradiction", "entailment", "neutral"];

const TASKS: &[TaskSpec] = &[
    TaskSpec { name: "cola", labels: BINARY, output_mode: OutputMode::Classification, metrics: MetricSet::Matthews },
    TaskSpec { name: "sst-2", labels: BINARY, output_mode: OutputMode::Classification, metrics: MetricSet::Accuracy },
    TaskSpec { name: "mrpc", labels: BINARY, output_mode: OutputMode::Classification, metrics: MetricSet::AccuracyAndF1 },
    TaskSpec { name: "sts-b", labels: &[], output_mode: OutputMode::Regression, metrics: MetricSet::PearsonSpearman },
    TaskSpec { name: "qqp", labels: BINARY, output_mode: OutputMode::Classification, metrics: MetricSet::AccuracyAndF1 },
    TaskSpec { name: "mnli", labels: NLI, output_mode: OutputMode::Classification, metrics: MetricSet::Accuracy },
    TaskSpec { name: "mnli-mm", labels: NLI, output_mode: OutputMode::Classification, metrics: MetricSet::Accuracy },
    TaskSpec { name: "qnli", labels: ENTAILMENT, output_mode: OutputMode::Classification, metrics: MetricSet::Accuracy },
    TaskSpec { name: "rte", labels: ENTAILMENT, output_mode: OutputMode::Classification, metrics: MetricSet::Accuracy },
    TaskSpec { name: "wnli", labels: BINARY, output_mode: OutputMode::Classification, metrics: MetricSet::Accuracy },
];

/// Looks a task up by (case-insensitive) name.
pub fn task_spec(name: &str) -> Result<TaskSpec> {
    let wanted = name.to_lowercase();
    TASKS
        .iter()
        .find(|t| t.name == wanted)
        .copied()
        .ok_or_else(|| {
            let known: Vec<&str> = TASKS.iter().map(|t| t.name).collect();
            DdpError::config(
                "task_name",
                format!("unknown task {name:?}, expected one of {}", known.join(", ")),
            )
        })
}

impl TaskSpec {
    /// Width of a prediction row: one per class, or 1 for regression.
    pub fn num_labels(&self) -> usize {
        match self.output_mode {
            OutputMode::Classification => self.labels.len(),
            OutputMode::Regression => 1,
        }
    }

    /// Maps a raw label string to the numeric training target.
    pub fn label_value(&self, raw: &str) -> Result<f32> {
        let raw = raw.trim();
        match self.output_mode {
            OutputMode::Classification => self
                .labels
                .iter()
                .position(|l| *l == raw)
                .map(|i| i as f32)
                .ok_or_else(|| {
                    DdpError::InvalidState(format!(
                        "label {raw:?} is not one of {:?} for task {}",
                        self.labels, self.name
                    ))
                }),
            OutputMode::Regression => raw.parse::<f32>().map_err(|_| {
                DdpError::InvalidState(format!(
                    "label {raw:?} is not a number for regression task {}",
                    self.name
                ))
            }),
        }
    }
}
