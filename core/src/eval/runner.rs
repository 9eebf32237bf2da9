//! Evaluates a model over a feature set.

use super::metrics::{MetricMap, OutputMode, compute_metrics};
use crate::data::{DataLoader, FeatureSet, TaskSpec};
use crate::error::Result;
use crate::models::FineTuneModel;
use std::sync::Arc;
use tracing::debug;

/// Runs `model` over `dataset` in sequential order and scores it for `task`.
pub fn evaluate_model(
    model: &dyn FineTuneModel,
    dataset: Arc<FeatureSet>,
    batch_size: usize,
    task: &TaskSpec,
) -> Result<MetricMap> {
    let loader: DataLoader<FeatureSet> = DataLoader::from_shared(dataset, batch_size);

    let mut preds = Vec::new();
    let mut labels = Vec::new();
    let mut eval_loss = 0.0f64;
    let mut steps = 0usize;

    for batch in loader.iter() {
        let batch = batch?;
        let out = model.forward(&batch)?;
        eval_loss += f64::from(out.loss);
        steps += 1;

        for row in out.rows() {
            preds.push(match task.output_mode {
                OutputMode::Classification => argmax(row) as f64,
                OutputMode::Regression => f64::from(row[0]),
            });
        }
        labels.extend(batch.labels.iter().map(|&l| f64::from(l)));
    }

    if steps > 0 {
        debug!(task = task.name, eval_loss = eval_loss / steps as f64, "evaluation loss");
    }
    Ok(compute_metrics(task.metrics, &preds, &labels))
}

/// Index of the largest score; the first one wins ties.
fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv { (i, v) } else { (bi, bv) }
        })
        .0
}
