//! Linear softmax classifier trained with cross-entropy.

use super::params::Parameter;
use super::traits::{FineTuneModel, ForwardOutput};
use super::{ModelKind, xavier_uniform};
use crate::data::Batch;
use crate::error::{DdpError, Result};
use rand::rngs::StdRng;
use rayon::prelude::*;

const WEIGHT: usize = 0;
const BIAS: usize = 1;

/// `logits = W x + b` with `W: [num_labels, width]`.
pub struct SoftmaxClassifier {
    width: usize,
    num_labels: usize,
    params: Vec<Parameter>,
}

impl SoftmaxClassifier {
    pub fn new(width: usize, num_labels: usize, rng: &mut StdRng) -> Result<Self> {
        if num_labels < 2 {
            return Err(DdpError::config(
                "num_labels",
                format!("a classifier needs at least 2 labels, got {num_labels}"),
            ));
        }
        let weight = Parameter::new(
            "classifier.weight",
            vec![num_labels, width],
            xavier_uniform(width, num_labels, rng),
        )?;
        let bias = Parameter::new("classifier.bias", vec![num_labels], vec![0.0; num_labels])?;
        Ok(Self {
            width,
            num_labels,
            params: vec![weight, bias],
        })
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        if batch.width != self.width {
            return Err(DdpError::ShapeMismatch {
                expected: vec![batch.len(), self.width],
                got: vec![batch.len(), batch.width],
            });
        }
        for &label in &batch.labels {
            if label < 0.0 || label as usize >= self.num_labels || label.fract() != 0.0 {
                return Err(DdpError::InvalidState(format!(
                    "label {label} is not a class index below {}",
                    self.num_labels
                )));
            }
        }
        Ok(())
    }

    fn logits(&self, batch: &Batch) -> Vec<f32> {
        let weight = &self.params[WEIGHT].value;
        let bias = &self.params[BIAS].value;
        let mut logits = vec![0.0f32; batch.len() * self.num_labels];
        logits
            .par_chunks_mut(self.num_labels)
            .zip(batch.inputs.par_chunks(self.width))
            .for_each(|(out, x)| {
                for (k, o) in out.iter_mut().enumerate() {
                    let row = &weight[k * self.width..(k + 1) * self.width];
                    *o = bias[k] + row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>();
                }
            });
        logits
    }
}

/// Numerically stable softmax of one row, in place.
fn softmax_in_place(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}

impl FineTuneModel for SoftmaxClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::SoftmaxClassifier
    }

    fn num_outputs(&self) -> usize {
        self.num_labels
    }

    fn forward(&self, batch: &Batch) -> Result<ForwardOutput> {
        self.check_batch(batch)?;
        let logits = self.logits(batch);

        let mut loss = 0.0f32;
        for (row, &label) in logits.chunks(self.num_labels).zip(&batch.labels) {
            let mut probs = row.to_vec();
            softmax_in_place(&mut probs);
            loss -= probs[label as usize].max(f32::MIN_POSITIVE).ln();
        }
        if !batch.is_empty() {
            loss /= batch.len() as f32;
        }

        Ok(ForwardOutput {
            loss,
            predictions: logits,
            num_outputs: self.num_labels,
        })
    }

    fn backward(&mut self, batch: &Batch, loss_scale: f32) -> Result<()> {
        self.check_batch(batch)?;
        if batch.is_empty() {
            return Ok(());
        }
        let mut dlogits = self.logits(batch);
        let scale = loss_scale / batch.len() as f32;
        for (row, &label) in dlogits.chunks_mut(self.num_labels).zip(&batch.labels) {
            softmax_in_place(row);
            row[label as usize] -= 1.0;
            row.iter_mut().for_each(|d| *d *= scale);
        }

        let width = self.width;
        let grad_w = self.params[WEIGHT].grad_mut();
        for (d, x) in dlogits.chunks(self.num_labels).zip(batch.inputs.chunks(width)) {
            for (k, &dk) in d.iter().enumerate() {
                let row = &mut grad_w[k * width..(k + 1) * width];
                row.iter_mut().zip(x).for_each(|(g, v)| *g += dk * v);
            }
        }

        let grad_b = self.params[BIAS].grad_mut();
        for d in dlogits.chunks(self.num_labels) {
            grad_b.iter_mut().zip(d).for_each(|(g, dk)| *g += dk);
        }
        Ok(())
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }
}
